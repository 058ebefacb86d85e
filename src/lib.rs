pub mod acquire;
pub mod augment;
pub mod benchmark;
pub mod cli;
pub mod config;
pub mod db;
pub mod embed;
pub mod error;
pub mod imdb;
pub mod index;
mod metrics;
pub mod search;
pub mod server;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use imdb::{IMDB, IMDBBuilder};
pub use search::SearchService;

/// 图片特征向量
pub type Embedding = Vec<f32>;
