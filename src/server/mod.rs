mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, middleware};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;

pub use self::api::API_KEY_HEADER;
pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::root_handler, api::health_handler, api::search_handler, api::reload_handler),
    components(schemas(
        types::SearchForm,
        types::SearchResponse,
        types::ReloadResponse,
        types::HealthResponse,
        types::RootResponse,
        types::ErrorResponse,
        crate::search::SearchResult,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/search", post(api::search_handler))
        .route("/reload", post(api::reload_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), api::require_api_key));

    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(api::health_handler))
        .route("/metrics", get(api::metrics_handler))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(protected)
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
