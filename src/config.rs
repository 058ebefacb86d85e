use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::embed::ThumbnailEmbedder;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "imretrieval", "imretrieval")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    ConfDir::new(path)
});

fn default_conf_dir() -> ConfDir {
    CONF_DIR.clone()
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// 缩略图特征的边长，向量维度为 边长 * 边长 * 3
    #[arg(long, value_name = "SIDE", default_value_t = 16)]
    pub thumbnail_size: u32,
}

impl From<&EmbedOptions> for ThumbnailEmbedder {
    fn from(opts: &EmbedOptions) -> Self {
        ThumbnailEmbedder::new(opts.thumbnail_size)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CatalogOptions {
    /// 商品目录数据库路径，支持 `sqlite://` 前缀，默认为配置目录下的 imretrieval.db
    #[arg(long, env = "DATABASE_URL", value_name = "PATH")]
    pub database: Option<String>,
    /// 图片相对路径的根目录
    #[arg(long, value_name = "DIR")]
    pub image_root: Option<PathBuf>,
    /// 下载图片的超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub timeout: u64,
}

impl CatalogOptions {
    /// 返回商品目录数据库文件路径
    pub fn database_path(&self, conf_dir: &ConfDir) -> PathBuf {
        match &self.database {
            Some(url) => {
                let path = url
                    .strip_prefix("sqlite://")
                    .or_else(|| url.strip_prefix("sqlite:"))
                    .unwrap_or(url);
                PathBuf::from(path)
            }
            None => conf_dir.database(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 向量检索的候选数量
    #[arg(long, value_name = "K", default_value_t = 50)]
    pub top_k: usize,
    /// 按商品去重后保留的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub limit: usize,
    /// 单次请求允许的最大 top_k 与 limit
    #[arg(long, value_name = "K", default_value_t = 1000)]
    pub max_top_k: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imretrieval", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imretrieval 配置目录，索引文件默认保存在这里
    #[arg(short, long, env = "IMRETRIEVAL_CONF_DIR", default_value_t = default_conf_dir())]
    pub conf_dir: ConfDir,
    /// 向量索引文件路径，默认为 <CONF_DIR>/index.flat
    #[arg(long, env = "IMRETRIEVAL_INDEX_PATH", value_name = "PATH")]
    pub index_path: Option<PathBuf>,
    /// 元数据文件路径，默认为 <CONF_DIR>/index.meta
    #[arg(long, env = "IMRETRIEVAL_METADATA_PATH", value_name = "PATH")]
    pub metadata_path: Option<PathBuf>,
}

impl Opts {
    /// 合并了路径覆盖参数后的配置目录
    pub fn conf_dir(&self) -> ConfDir {
        let mut conf_dir = self.conf_dir.clone();
        if let Some(path) = &self.index_path {
            conf_dir.set_vectors(path.clone());
        }
        if let Some(path) = &self.metadata_path {
            conf_dir.set_metadata(path.clone());
        }
        conf_dir
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从商品目录中读取图片并构建索引
    Index(IndexCommand),
    /// 搜索一张本地图片
    Search(SearchCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
    /// 使用商品目录中的图片评估检索质量
    Benchmark(BenchmarkCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
    vectors: Option<PathBuf>,
    metadata: Option<PathBuf>,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), vectors: None, metadata: None }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn set_vectors(&mut self, path: PathBuf) {
        self.vectors = Some(path);
    }

    pub fn set_metadata(&mut self, path: PathBuf) {
        self.metadata = Some(path);
    }

    /// 返回默认商品目录数据库的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imretrieval.db")
    }

    /// 返回向量索引文件的路径
    pub fn vectors(&self) -> PathBuf {
        self.vectors.clone().unwrap_or_else(|| self.path.join("index.flat"))
    }

    /// 返回元数据文件的路径
    pub fn metadata(&self) -> PathBuf {
        self.metadata.clone().unwrap_or_else(|| self.path.join("index.meta"))
    }

    /// 返回基准测试结果的默认输出目录
    pub fn benchmark_dir(&self) -> PathBuf {
        self.path.join("benchmark_results")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for ConfDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
