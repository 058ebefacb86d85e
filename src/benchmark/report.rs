use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use super::{AggregateMetrics, EvalMode, FailureCounts, RunOutcome};
use crate::utils::round_to;

pub const REPORT_FILE_NAME: &str = "benchmark_results.json";

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub device: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMetrics {
    pub top1_accuracy: f64,
    pub top5_accuracy: f64,
    pub top10_accuracy: f64,
    pub mean_reciprocal_rank: f64,
    pub recall_at_5: f64,
    pub recall_at_10: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceTime {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetrics {
    pub retrieval_metrics: RetrievalMetrics,
    pub inference_time: InferenceTime,
    pub confusion_matrix: Vec<Vec<u64>>,
    pub class_labels: Vec<i64>,
    pub total_samples: usize,
    pub correct_predictions_top1: usize,
    pub incorrect_predictions_top1: usize,
    pub unique_products: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawData {
    /// 排名第一的商品，没有结果时为 null
    pub predictions: Vec<Option<i64>>,
    pub ground_truth: Vec<i64>,
    pub inference_times: Vec<f64>,
    pub categories: Vec<String>,
    pub failed_samples: usize,
    pub failure_breakdown: FailureCounts,
}

/// 写入磁盘的评估报告
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub model_info: ModelInfo,
    pub test_mode: String,
    pub metrics: ReportMetrics,
    pub raw_data: RawData,
}

impl BenchmarkReport {
    pub fn new(
        model_info: ModelInfo,
        mode: EvalMode,
        metrics: &AggregateMetrics,
        outcome: &RunOutcome,
    ) -> Self {
        let records = &outcome.records;
        let t = &metrics.inference_time;
        Self {
            model_info,
            test_mode: mode.label(),
            metrics: ReportMetrics {
                retrieval_metrics: RetrievalMetrics {
                    top1_accuracy: round_to(metrics.top1_accuracy, 2),
                    top5_accuracy: round_to(metrics.top5_accuracy, 2),
                    top10_accuracy: round_to(metrics.top10_accuracy, 2),
                    mean_reciprocal_rank: round_to(metrics.mean_reciprocal_rank, 4),
                    recall_at_5: round_to(metrics.recall_at_5, 2),
                    recall_at_10: round_to(metrics.recall_at_10, 2),
                },
                inference_time: InferenceTime {
                    mean_ms: round_to(t.mean_ms, 2),
                    std_ms: round_to(t.std_ms, 2),
                    min_ms: round_to(t.min_ms, 2),
                    max_ms: round_to(t.max_ms, 2),
                },
                confusion_matrix: metrics.confusion_matrix.matrix.clone(),
                class_labels: metrics.confusion_matrix.labels.clone(),
                total_samples: metrics.total_samples,
                correct_predictions_top1: metrics.correct_predictions_top1,
                incorrect_predictions_top1: metrics.incorrect_predictions_top1,
                unique_products: metrics.unique_products,
            },
            raw_data: RawData {
                predictions: records.iter().map(|r| r.predicted_product_id()).collect(),
                ground_truth: records.iter().map(|r| r.query_product_id).collect(),
                inference_times: records.iter().map(|r| r.embedding_latency_ms).collect(),
                categories: records.iter().map(|r| r.category.clone()).collect(),
                failed_samples: outcome.failures(),
                failure_breakdown: outcome.failure_breakdown,
            },
        }
    }

    /// 保存为 `<dir>/benchmark_results.json`，返回文件路径
    pub fn save(&self, dir: impl AsRef<Path>) -> crate::Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(std::io::Error::from)?;
        writer.flush()?;
        info!("评估结果已保存：{}", path.display());
        Ok(path)
    }

    /// 在日志中输出结果摘要
    pub fn log_summary(&self) {
        let line = "=".repeat(70);
        let sep = "-".repeat(70);
        let m = &self.metrics.retrieval_metrics;
        let t = &self.metrics.inference_time;
        info!("{line}");
        info!("图片检索评估结果");
        info!("{line}");
        info!("模型：{}", self.model_info.model_name);
        info!("设备：{}", self.model_info.device);
        info!("评估模式：{}", self.test_mode.to_uppercase());
        info!("样本数：{}", self.metrics.total_samples);
        info!("{sep}");
        info!("检索指标（商品级）：");
        info!("  Top-1 准确率：       {}%", m.top1_accuracy);
        info!("  Top-5 准确率：       {}%", m.top5_accuracy);
        info!("  Top-10 准确率：      {}%", m.top10_accuracy);
        info!("  平均倒数排名：       {}", m.mean_reciprocal_rank);
        info!("  Recall@5：           {}%", m.recall_at_5);
        info!("  Recall@10：          {}%", m.recall_at_10);
        info!("{sep}");
        info!("特征提取耗时（毫秒/张）：");
        info!("  平均：{} ms", t.mean_ms);
        info!("  标准差：{} ms", t.std_ms);
        info!("  最小：{} ms", t.min_ms);
        info!("  最大：{} ms", t.max_ms);
        info!("{sep}");
        info!(
            "Top-1 结果：正确 {}，错误 {}",
            self.metrics.correct_predictions_top1, self.metrics.incorrect_predictions_top1
        );
        info!("商品数：{}", self.metrics.unique_products);
        info!("失败样本：{}", self.raw_data.failed_samples);
        info!("{line}");
    }
}
