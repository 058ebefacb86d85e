use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use super::types::ErrorResponse;
use crate::error::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// 上传内容不是图片
#[derive(Debug, thiserror::Error)]
#[error("上传的文件不是图片：{0}")]
pub struct InvalidUpload(pub String);

/// 请求参数超出允许范围
#[derive(Debug, thiserror::Error)]
#[error("参数 {name} 超出范围：{value} > {max}")]
pub struct InvalidParam {
    pub name: &'static str,
    pub value: usize,
    pub max: usize,
}

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if self.0.is::<InvalidUpload>() || self.0.is::<InvalidParam>() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<Error>() {
            Some(Error::IndexUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Some(Error::Decode(_) | Error::Embedding(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败：{:#}", self.0);
        }
        (status, Json(ErrorResponse { detail: format!("{:#}", self.0) })).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
