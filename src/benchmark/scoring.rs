use std::collections::BTreeSet;

use serde::Serialize;

use super::QueryRecord;

/// 混淆矩阵，行为真实商品，列为排名第一的预测商品
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    /// 升序排列的商品 ID
    pub labels: Vec<i64>,
    pub matrix: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn compute(records: &[QueryRecord]) -> Self {
        let mut labels = BTreeSet::new();
        for record in records {
            labels.insert(record.query_product_id);
            labels.extend(record.predicted_product_id());
        }
        let labels = labels.into_iter().collect::<Vec<_>>();

        let mut matrix = vec![vec![0; labels.len()]; labels.len()];
        for record in records {
            let Some(predicted) = record.predicted_product_id() else {
                continue;
            };
            // 两个 ID 都已加入 labels，二分查找一定成功
            if let (Ok(row), Ok(col)) =
                (labels.binary_search(&record.query_product_id), labels.binary_search(&predicted))
            {
                matrix[row][col] += 1;
            }
        }
        Self { labels, matrix }
    }
}

/// 特征提取耗时统计，单位为毫秒
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    /// 总体标准差
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    pub fn compute(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Some(Self {
            mean_ms: mean,
            std_ms: var.sqrt(),
            min_ms: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// 汇总指标，所有准确率均为百分比
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub top1_accuracy: f64,
    pub top5_accuracy: f64,
    pub top10_accuracy: f64,
    pub recall_at_5: f64,
    pub recall_at_10: f64,
    pub mean_reciprocal_rank: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub inference_time: LatencyStats,
    pub total_samples: usize,
    pub correct_predictions_top1: usize,
    pub incorrect_predictions_top1: usize,
    pub unique_products: usize,
}

impl AggregateMetrics {
    /// 从查询记录计算全部指标，记录为空时返回 `None`
    pub fn compute(records: &[QueryRecord]) -> Option<Self> {
        let latencies = records.iter().map(|r| r.embedding_latency_ms).collect::<Vec<_>>();
        let inference_time = LatencyStats::compute(&latencies)?;

        let correct = records.iter().filter(|r| r.is_top1_correct).count();
        let confusion_matrix = ConfusionMatrix::compute(records);
        let unique_products = confusion_matrix.labels.len();

        Some(Self {
            top1_accuracy: percent(correct, records.len()),
            top5_accuracy: top_k_accuracy(records, 5),
            top10_accuracy: top_k_accuracy(records, 10),
            recall_at_5: recall_at_k(records, 5),
            recall_at_10: recall_at_k(records, 10),
            mean_reciprocal_rank: mean_reciprocal_rank(records),
            confusion_matrix,
            inference_time,
            total_samples: records.len(),
            correct_predictions_top1: correct,
            incorrect_predictions_top1: records.len() - correct,
            unique_products,
        })
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.;
    }
    count as f64 / total as f64 * 100.
}

/// 真实商品出现在前 k 条结果中的查询比例
pub fn top_k_accuracy(records: &[QueryRecord], k: usize) -> f64 {
    let hits = records.iter().filter(|r| r.first_hit_rank().is_some_and(|rank| rank <= k)).count();
    percent(hits, records.len())
}

/// 每个查询只有一个相关商品，召回率与 top-k 准确率相同
pub fn recall_at_k(records: &[QueryRecord], k: usize) -> f64 {
    top_k_accuracy(records, k)
}

pub fn mean_reciprocal_rank(records: &[QueryRecord]) -> f64 {
    if records.is_empty() {
        return 0.;
    }
    let sum = records
        .iter()
        .map(|r| r.first_hit_rank().map_or(0., |rank| 1. / rank as f64))
        .sum::<f64>();
    sum / records.len() as f64
}
