use std::sync::Arc;

use crate::SearchService;
use crate::config::{ConfDir, SearchOptions};
use crate::embed::Embedder;

/// 应用状态
pub struct AppState {
    /// 检索服务
    pub service: SearchService<Box<dyn Embedder>>,
    /// 索引所在的配置目录，重新加载时使用
    pub conf_dir: ConfDir,
    /// 鉴权密钥，为空时不检查
    pub api_key: Option<String>,
    /// 搜索配置选项
    pub search: SearchOptions,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        service: SearchService<Box<dyn Embedder>>,
        conf_dir: ConfDir,
        api_key: Option<String>,
        search: SearchOptions,
    ) -> Arc<Self> {
        let api_key = api_key.filter(|key| !key.is_empty());
        Arc::new(AppState { service, conf_dir, api_key, search })
    }
}
