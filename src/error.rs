use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// 构建索引时向量长度不一致
    #[error("向量维度不一致：期望 {expected}，位置 {position} 的向量维度为 {actual}")]
    DimensionMismatch { expected: usize, actual: usize, position: usize },
    /// 查询向量与索引维度不一致
    #[error("查询向量维度不一致：索引维度为 {expected}，查询维度为 {actual}")]
    QueryDimension { expected: usize, actual: usize },
    /// 加载的索引与当前特征提取器不匹配
    #[error("索引维度为 {index}，特征提取器维度为 {embedder}")]
    EmbedderDimension { index: usize, embedder: usize },
    #[error("向量维度不能为 0")]
    ZeroDimension,
    #[error("没有可用于构建索引的向量")]
    EmptyIndex,
    /// 元数据与索引不匹配，正常情况下不可能出现
    #[error("索引位置越界：{position} >= {len}，索引与元数据可能已损坏")]
    OutOfRange { position: usize, len: usize },
    #[error("索引尚未加载")]
    IndexUnavailable,
    #[error("索引文件不存在：{}", path.display())]
    MissingArtifact { path: PathBuf },
    #[error("索引文件损坏 {}：{reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },
    #[error("向量数量与元数据数量不一致：向量 {vectors} 条，元数据 {entries} 条")]
    PairMismatch { vectors: usize, entries: usize },
    #[error("元数据 {} 与向量文件不是同一批构建的产物", path.display())]
    PairDigestMismatch { path: PathBuf },
    #[error("获取图片失败 {location}：{reason}")]
    Acquisition { location: String, reason: String },
    #[error("图片解码失败：{0}")]
    Decode(#[from] image::ImageError),
    #[error("特征提取失败：{0}")]
    Embedding(String),
    #[error("top_k 不能小于 {min}，当前为 {actual}")]
    InvalidTopK { min: usize, actual: usize },
    #[error("数据库错误：{0}")]
    Catalog(#[from] sqlx::Error),
    #[error("元数据编码失败：{0}")]
    Metadata(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
