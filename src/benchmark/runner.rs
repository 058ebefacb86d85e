use std::sync::Arc;

use indicatif::ProgressBar;
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::block_in_place;

use super::{EvalMode, FailureCounts, QueryRecord, RunOutcome, SkipReason, TestSample};
use crate::acquire::ImageSource;
use crate::augment::Augmenter;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::search::SearchService;
use crate::utils;

/// top-5 与 top-10 指标来自同一次查询，因此 top_k 至少为 10
pub const MIN_TOP_K: usize = 10;

/// 依次查询每个测试样本并记录结果
pub struct BenchmarkRunner<'a, E, S> {
    service: &'a SearchService<E>,
    source: Arc<S>,
    mode: EvalMode,
    top_k: usize,
    augmenter: Option<Augmenter>,
    progress: bool,
}

impl<'a, E, S> BenchmarkRunner<'a, E, S>
where
    E: Embedder,
    S: ImageSource + 'static,
{
    pub fn new(
        service: &'a SearchService<E>,
        source: Arc<S>,
        mode: EvalMode,
        top_k: usize,
        seed: u64,
    ) -> Result<Self> {
        if top_k < MIN_TOP_K {
            return Err(Error::InvalidTopK { min: MIN_TOP_K, actual: top_k });
        }
        let augmenter = match mode {
            EvalMode::Normal => None,
            EvalMode::Augmented(preset) => Some(Augmenter::new(preset, seed)),
        };
        Ok(Self { service, source, mode, top_k, augmenter, progress: true })
    }

    /// 是否显示进度条
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    /// 执行评估
    ///
    /// 单个样本的失败只计数，不会中断评估；索引缺失、损坏或维度不一致时返回错误。
    /// 下一张图片的获取与当前样本的处理同时进行。
    pub async fn run(&self, samples: Vec<TestSample>) -> Result<RunOutcome> {
        let imdb = self.service.current().ok_or(Error::IndexUnavailable)?;
        self.service.check_dim(&imdb)?;

        info!("评估模式：{}，样本数：{}", self.mode, samples.len());
        let pb = if self.progress {
            ProgressBar::new(samples.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(utils::pb_style());

        let (tx, mut rx) = mpsc::channel(1);
        let source = self.source.clone();
        let producer = tokio::spawn(async move {
            for sample in samples {
                let fetched = source.fetch(&sample.image_url).await;
                if tx.send((sample, fetched)).await.is_err() {
                    break;
                }
            }
        });

        let mut records = Vec::new();
        let mut failures = FailureCounts::default();
        while let Some((sample, fetched)) = rx.recv().await {
            match self.process(&sample, fetched) {
                Ok(Ok(record)) => records.push(record),
                Ok(Err(reason)) => failures.record(reason),
                Err(e) => {
                    producer.abort();
                    return Err(e);
                }
            }
            pb.inc(1);
            pb.set_message(format!("成功 {} / 失败 {}", records.len(), failures.total()));
        }
        pb.finish_and_clear();

        info!("评估完成：成功 {}，失败 {}", records.len(), failures.total());
        Ok(RunOutcome { records, failure_breakdown: failures })
    }

    /// 处理单个样本，外层错误表示需要中断整个评估
    fn process(
        &self,
        sample: &TestSample,
        fetched: Result<Vec<u8>>,
    ) -> Result<Result<QueryRecord, SkipReason>> {
        let image = match fetched.and_then(|data| utils::decode_image(&data)) {
            Ok(image) => image,
            Err(e) => {
                warn!("获取图片 {} 失败：{e}", sample.image_id);
                return Ok(Err(SkipReason::Acquisition));
            }
        };

        let (query, exclude) = match &self.augmenter {
            Some(augmenter) => (augmenter.apply(&image, sample.image_id), None),
            None => (image, Some(sample.image_id)),
        };

        let searched = block_in_place(|| self.service.search(&query, self.top_k, exclude));
        let (results, elapsed) = match searched {
            Ok(searched) => searched,
            Err(
                e @ (Error::IndexUnavailable
                | Error::OutOfRange { .. }
                | Error::QueryDimension { .. }),
            ) => return Err(e),
            Err(e @ Error::Embedding(_)) => {
                warn!("图片 {} 特征提取失败：{e}", sample.image_id);
                return Ok(Err(SkipReason::Embedding));
            }
            Err(e) => {
                warn!("图片 {} 检索失败：{e}", sample.image_id);
                return Ok(Err(SkipReason::Search));
            }
        };

        let is_top1_correct = results.first().is_some_and(|r| r.product_id == sample.product_id);
        Ok(Ok(QueryRecord {
            query_image_id: sample.image_id,
            query_product_id: sample.product_id,
            category: sample.category.clone().unwrap_or_else(|| "Unknown".to_string()),
            ranked_results: results,
            is_top1_correct,
            embedding_latency_ms: elapsed.as_secs_f64() * 1000.,
        }))
    }
}
