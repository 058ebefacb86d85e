use std::sync::LazyLock;
use std::time::Duration;

use prometheus::*;

static METRIC_SEARCH_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "imr_search_count",
        "count of the served search requests",
        &["outcome"]
    )
    .unwrap()
});

static METRIC_EMBEDDING_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imr_embedding_duration",
        "duration of the query embedding in seconds"
    )
    .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imr_search_duration",
        "duration of the whole search request in seconds"
    )
    .unwrap()
});

static METRIC_SEARCH_BEST_SCORE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "imr_search_best_score",
        "similarity score of the top result",
        (1..=20).map(|x| x as f64 * 0.05).collect()
    )
    .unwrap()
});

/// 记录一次搜索请求的结果，`outcome` 为 ok、bad_request、unavailable 或 error
pub fn inc_search_count(outcome: &str) {
    METRIC_SEARCH_COUNT.with_label_values(&[outcome]).inc();
}

pub fn observe_embedding_duration(duration: Duration) {
    METRIC_EMBEDDING_DURATION.observe(duration.as_secs_f64());
}

pub fn observe_search_duration(duration: Duration) {
    METRIC_SEARCH_DURATION.observe(duration.as_secs_f64());
}

pub fn observe_best_score(score: f32) {
    METRIC_SEARCH_BEST_SCORE.observe(score as f64);
}

/// 以 Prometheus 文本格式导出所有指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&prometheus::gather()).unwrap_or_default()
}
