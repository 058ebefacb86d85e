use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::Serialize;
use utoipa::ToSchema;

use crate::search::SearchResult;

/// 搜索请求参数
#[derive(TryFromMultipart)]
pub struct SearchRequest {
    pub file: FieldData<Bytes>,
    pub top_k: Option<usize>,
    pub limit: Option<usize>,
}

/// 搜索表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 向量检索的候选数量
    pub top_k: Option<usize>,
    /// 按商品去重后保留的结果数量
    pub limit: Option<usize>,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub success: bool,
    /// 按商品去重后的结果
    pub results: Vec<SearchResult>,
    /// 请求处理耗时，单位为毫秒
    pub query_time_ms: u64,
}

/// 重新加载索引的响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
    pub indexed_images: usize,
}

/// 服务信息
#[derive(Debug, Serialize, ToSchema)]
pub struct RootResponse {
    pub service: String,
    pub version: String,
    pub status: String,
    pub indexed_images: usize,
}

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub indexed_images: usize,
}

/// 错误响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}
