use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use log::{error, info};

use crate::acquire::AnySource;
use crate::augment::AugmentPreset;
use crate::benchmark::{BenchmarkReport, BenchmarkRunner, EvalMode, ModelInfo};
use crate::cli::SubCommandExtend;
use crate::config::{CatalogOptions, EmbedOptions, Opts};
use crate::db::{crud, open_catalog};
use crate::embed::{Embedder, ThumbnailEmbedder};
use crate::SearchService;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// 使用原图查询并排除图片本身
    Normal,
    /// 使用增强后的图片查询
    Augmented,
}

#[derive(Parser, Debug, Clone)]
pub struct BenchmarkCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub catalog: CatalogOptions,
    /// 评估模式
    #[arg(long, value_enum, default_value_t = ModeArg::Normal)]
    pub mode: ModeArg,
    /// 增强强度，仅在 augmented 模式下生效
    #[arg(long, value_enum, default_value_t = AugmentPreset::Light)]
    pub strength: AugmentPreset,
    /// 测试样本数量
    #[arg(long, value_name = "COUNT", default_value_t = 100)]
    pub limit: i64,
    /// 每次查询返回的结果数量，至少为 10
    #[arg(long, value_name = "K", default_value_t = 10)]
    pub top_k: usize,
    /// 图片增强的随机数种子
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// 结果输出目录，默认为 <CONF_DIR>/benchmark_results
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
    /// 不显示进度条
    #[arg(long)]
    pub no_progress: bool,
}

impl BenchmarkCommand {
    pub fn eval_mode(&self) -> EvalMode {
        match self.mode {
            ModeArg::Normal => EvalMode::Normal,
            ModeArg::Augmented => EvalMode::Augmented(self.strength),
        }
    }
}

impl SubCommandExtend for BenchmarkCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let conf_dir = opts.conf_dir();
        let mode = self.eval_mode();

        let service = SearchService::new(ThumbnailEmbedder::from(&self.embed));
        service.reload(&conf_dir)?;

        let db_path = self.catalog.database_path(&conf_dir);
        let db = open_catalog(&db_path)
            .await
            .with_context(|| format!("无法打开商品目录 {}", db_path.display()))?;
        let samples = crud::list_catalog_images(&db, Some(self.limit)).await?;
        info!("已加载 {} 个测试样本", samples.len());

        let source = Arc::new(AnySource::new(
            self.catalog.image_root.clone(),
            self.catalog.timeout(),
        )?);
        let runner = BenchmarkRunner::new(&service, source, mode, self.top_k, self.seed)?
            .progress(!self.no_progress);
        let outcome = runner.run(samples).await?;

        let Some(metrics) = outcome.metrics() else {
            error!("没有任何样本评估成功，失败 {} 个", outcome.failures());
            bail!("评估失败：没有成功的样本");
        };

        let model_info = ModelInfo {
            model_name: service.embedder().name().to_string(),
            device: service.embedder().device().to_string(),
        };
        let report = BenchmarkReport::new(model_info, mode, &metrics, &outcome);
        report.log_summary();

        let output = self.output.clone().unwrap_or_else(|| conf_dir.benchmark_dir());
        let path = report.save(&output)?;
        println!("{}", path.display());
        Ok(())
    }
}
