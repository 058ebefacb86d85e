mod flat;

pub use flat::*;

use crate::Embedding;
use crate::error::Result;

/// 一条最近邻结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 向量在索引中的位置，即插入顺序
    pub position: usize,
    /// 与查询向量的平方欧氏距离
    pub distance: f32,
}

/// 向量索引
///
/// 实现需要保证：
/// - 位置按插入顺序从 0 开始连续分配
/// - `search` 返回 `min(k, len)` 条结果，按距离升序排列，距离相同时位置小的在前
pub trait VectorIndex {
    /// 向量维度
    fn dim(&self) -> usize;

    /// 已索引的向量数量
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 追加一批向量，任意一条维度不符时整批都不会写入
    fn add(&mut self, vectors: &[Embedding]) -> Result<()>;

    /// 搜索最接近的 k 个向量
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}
