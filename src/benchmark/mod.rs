//! 检索质量评估
//!
//! 使用商品目录中的图片作为查询，检查排名靠前的结果中是否包含同一商品。

mod report;
mod runner;
mod scoring;

use std::fmt;

use serde::Serialize;

pub use report::*;
pub use runner::*;
pub use scoring::*;

use crate::augment::AugmentPreset;
use crate::db::CatalogImage;
use crate::search::SearchResult;

/// 评估使用的测试样本
pub type TestSample = CatalogImage;

/// 评估模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// 使用原图查询，结果中排除图片本身
    Normal,
    /// 使用增强后的图片查询，不做排除
    Augmented(AugmentPreset),
}

impl EvalMode {
    pub fn label(&self) -> String {
        match self {
            Self::Normal => "normal".to_string(),
            Self::Augmented(preset) => format!("augmented_{preset}"),
        }
    }
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// 样本被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// 图片无法获取或解码
    Acquisition,
    /// 特征提取失败
    Embedding,
    /// 检索失败
    Search,
}

/// 各原因的失败样本数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub acquisition: usize,
    pub embedding: usize,
    pub search: usize,
}

impl FailureCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Acquisition => self.acquisition += 1,
            SkipReason::Embedding => self.embedding += 1,
            SkipReason::Search => self.search += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.acquisition + self.embedding + self.search
    }
}

/// 一次成功查询的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub query_image_id: i64,
    pub query_product_id: i64,
    /// 商品分类，缺失时为 `Unknown`
    pub category: String,
    /// 完整的排序结果
    pub ranked_results: Vec<SearchResult>,
    pub is_top1_correct: bool,
    pub embedding_latency_ms: f64,
}

impl QueryRecord {
    /// 排名第一的商品 ID
    pub fn predicted_product_id(&self) -> Option<i64> {
        self.ranked_results.first().map(|r| r.product_id)
    }

    /// 第一个命中真实商品的排名，从 1 开始
    pub fn first_hit_rank(&self) -> Option<usize> {
        self.ranked_results
            .iter()
            .position(|r| r.product_id == self.query_product_id)
            .map(|i| i + 1)
    }
}

/// 一次评估的结果
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub records: Vec<QueryRecord>,
    pub failure_breakdown: FailureCounts,
}

impl RunOutcome {
    pub fn failures(&self) -> usize {
        self.failure_breakdown.total()
    }

    /// 没有任何成功样本时返回 `None`
    pub fn metrics(&self) -> Option<AggregateMetrics> {
        AggregateMetrics::compute(&self.records)
    }
}
