use anyhow::Context;
use clap::Parser;
use log::info;

use crate::acquire::AnySource;
use crate::cli::SubCommandExtend;
use crate::config::{CatalogOptions, EmbedOptions, Opts};
use crate::db::{crud, open_catalog};
use crate::embed::ThumbnailEmbedder;
use crate::IMDBBuilder;

#[derive(Parser, Debug, Clone)]
pub struct IndexCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub catalog: CatalogOptions,
    /// 最多索引的图片数量
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<i64>,
    /// 不显示进度条
    #[arg(long)]
    pub no_progress: bool,
}

impl SubCommandExtend for IndexCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let conf_dir = opts.conf_dir();
        let db_path = self.catalog.database_path(&conf_dir);
        let db = open_catalog(&db_path)
            .await
            .with_context(|| format!("无法打开商品目录 {}", db_path.display()))?;
        let rows = crud::list_catalog_images(&db, self.limit).await?;
        info!("商品目录中共有 {} 张图片", rows.len());

        let embedder = ThumbnailEmbedder::from(&self.embed);
        let source = AnySource::new(self.catalog.image_root.clone(), self.catalog.timeout())?;
        let (imdb, summary) = IMDBBuilder::new(&embedder, &source)
            .progress(!self.no_progress)
            .build(&rows)
            .await
            .context("索引构建失败")?;

        imdb.save(&conf_dir)?;
        println!("indexed {} images, {} failed", summary.indexed, summary.failed);
        Ok(())
    }
}
