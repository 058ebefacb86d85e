use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;

use crate::cli::SubCommandExtend;
use crate::config::{EmbedOptions, SearchOptions};
use crate::embed::{Embedder, ThumbnailEmbedder};
use crate::{Opts, SearchService, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 请求验证密钥，不填则不验证
    #[arg(long, env = "API_KEY", value_name = "KEY")]
    pub api_key: Option<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let conf_dir = opts.conf_dir();
        let embedder: Box<dyn Embedder> = Box::new(ThumbnailEmbedder::from(&self.embed));
        info!("特征提取器：{}（{}）", embedder.name(), embedder.device());

        // 索引缺失时服务照常启动，构建索引后可通过 /reload 加载
        let service = SearchService::new(embedder);
        if let Err(e) = service.reload(&conf_dir) {
            warn!("索引加载失败，搜索将不可用：{e}");
        }

        if self.api_key.is_none() {
            warn!("未设置 API Key，所有请求都不会鉴权");
        }

        // 创建应用状态
        let state =
            server::AppState::new(service, conf_dir, self.api_key.clone(), self.search.clone());

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
