use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// 图片获取方式
pub trait ImageSource: Send + Sync {
    /// 读取 `location` 指向的图片原始字节
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

fn acquisition_error(location: &str, reason: impl ToString) -> Error {
    Error::Acquisition { location: location.to_string(), reason: reason.to_string() }
}

/// 从本地文件系统读取图片，支持 `file://` 前缀
#[derive(Debug, Clone, Default)]
pub struct LocalSource {
    /// 相对路径的根目录
    root: Option<PathBuf>,
}

impl LocalSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for LocalSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.resolve(location);
        tokio::fs::read(&path).await.map_err(|e| acquisition_error(location, e))
    }
}

/// 通过 HTTP 下载图片
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| acquisition_error("<client>", e))?;
        Ok(Self { client })
    }
}

impl ImageSource for HttpSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        debug!("下载图片：{location}");
        let response = self
            .client
            .get(location)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| acquisition_error(location, e))?;
        let bytes = response.bytes().await.map_err(|e| acquisition_error(location, e))?;
        Ok(bytes.to_vec())
    }
}

/// 根据地址协议选择 HTTP 或本地文件
#[derive(Debug, Clone)]
pub struct AnySource {
    local: LocalSource,
    http: HttpSource,
}

impl AnySource {
    pub fn new(root: Option<PathBuf>, timeout: Duration) -> Result<Self> {
        Ok(Self { local: LocalSource::new(root), http: HttpSource::new(timeout)? })
    }
}

impl ImageSource for AnySource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            self.http.fetch(location).await
        } else {
            self.local.fetch(location).await
        }
    }
}
