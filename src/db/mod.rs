use std::path::Path;

use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

/// 打开已有的商品目录数据库，不会创建新文件
///
/// 商品目录由外部系统维护，这里只读取。
pub async fn open_catalog(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("打开商品目录: {}", filename.display());

    let options = SqliteConnectOptions::new().filename(filename).create_if_missing(false);
    SqlitePool::connect_with(options).await
}
