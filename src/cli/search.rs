use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, Opts, SearchOptions};
use crate::embed::ThumbnailEmbedder;
use crate::search::{SearchResult, deduplicate_by_product};
use crate::{SearchService, utils};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    pub image: String,
    /// 不按商品去重，直接输出向量检索结果
    #[arg(long)]
    pub no_dedup: bool,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let data = tokio::fs::read(&self.image)
            .await
            .with_context(|| format!("无法读取图片 {}", self.image))?;
        let image = utils::decode_image(&data)?;

        let service = SearchService::new(ThumbnailEmbedder::from(&self.embed));
        service.reload(&opts.conf_dir())?;

        let (results, elapsed) =
            block_in_place(|| service.search(&image, self.search.top_k, None))?;
        log::debug!("特征提取耗时 {:.2}ms", elapsed.as_secs_f64() * 1000.);

        let results = match self.no_dedup {
            true => results,
            false => deduplicate_by_product(results, self.search.limit),
        };
        print_result(&results, self)
    }
}

fn print_result(result: &[SearchResult], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for r in result {
                println!("{:.4}\t{}\t{}", r.similarity_score, r.product_id, r.image_url);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
