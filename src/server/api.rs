use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipart;
use log::{info, warn};
use tokio::task::block_in_place;

use super::error::{InvalidParam, InvalidUpload, Result};
use super::state::AppState;
use super::types::*;
use crate::error::Error;
use crate::metrics;
use crate::search::deduplicate_by_product;

/// 鉴权请求头
pub const API_KEY_HEADER: &str = "x-api-key";

/// 检查 `X-API-Key` 请求头
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = request.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("拒绝了一个 API Key 无效的请求");
            let body = ErrorResponse { detail: "Invalid API Key".to_string() };
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }
    }
    next.run(request).await
}

/// 服务信息
#[utoipa::path(get, path = "/", responses((status = 200, body = RootResponse)))]
pub async fn root_handler(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    let health = state.service.health();
    Json(RootResponse {
        service: "Image Search Service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        indexed_images: health.indexed_images,
    })
}

/// 健康检查
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health();
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: health.loaded,
        indexed_images: health.indexed_images,
    })
}

/// 搜索一张图片
#[utoipa::path(
    post,
    path = "/search",
    request_body(content = SearchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, body = ErrorResponse),
        (status = 401, body = ErrorResponse),
        (status = 503, body = ErrorResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    let result = search(&state, &data);
    metrics::observe_search_duration(start.elapsed());

    let label = match &result {
        Ok(_) => "ok",
        Err(e) if e.is::<InvalidUpload>() || e.is::<InvalidParam>() => "bad_request",
        Err(e) => match e.downcast_ref::<Error>() {
            Some(Error::IndexUnavailable) => "unavailable",
            Some(Error::Decode(_) | Error::Embedding(_)) => "bad_request",
            _ => "error",
        },
    };
    metrics::inc_search_count(label);

    let results = result?;
    Ok(Json(SearchResponse {
        success: true,
        results,
        query_time_ms: start.elapsed().as_millis() as u64,
    }))
}

fn search(
    state: &AppState,
    data: &SearchRequest,
) -> anyhow::Result<Vec<crate::search::SearchResult>> {
    if state.service.current().is_none() {
        return Err(Error::IndexUnavailable.into());
    }
    if let Some(content_type) = &data.file.metadata.content_type {
        if !content_type.starts_with("image/") {
            return Err(InvalidUpload(content_type.clone()).into());
        }
    }

    let max = state.search.max_top_k;
    let top_k = data.top_k.unwrap_or(state.search.top_k);
    if top_k > max {
        return Err(InvalidParam { name: "top_k", value: top_k, max }.into());
    }
    let limit = data.limit.unwrap_or(state.search.limit);
    if limit > max {
        return Err(InvalidParam { name: "limit", value: limit, max }.into());
    }
    info!("正在搜索上传图片：{} 字节", data.file.contents.len());

    let (results, elapsed) =
        block_in_place(|| state.service.search_bytes(&data.file.contents, top_k))?;
    metrics::observe_embedding_duration(elapsed);
    if let Some(best) = results.first() {
        metrics::observe_best_score(best.similarity_score);
    }
    Ok(deduplicate_by_product(results, limit))
}

/// 从配置目录重新加载索引
#[utoipa::path(
    post,
    path = "/reload",
    responses(
        (status = 200, body = ReloadResponse),
        (status = 500, body = ErrorResponse),
    )
)]
pub async fn reload_handler(State(state): State<Arc<AppState>>) -> Result<Json<ReloadResponse>> {
    let indexed_images = block_in_place(|| state.service.reload(&state.conf_dir))
        .map_err(|e| anyhow::Error::new(e).context("Reload failed"))?;
    Ok(Json(ReloadResponse {
        success: true,
        message: "Index reloaded successfully".to_string(),
        indexed_images,
    }))
}

/// Prometheus 指标
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}
