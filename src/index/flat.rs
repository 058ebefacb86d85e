use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rayon::prelude::*;

use super::{Neighbor, VectorIndex};
use crate::Embedding;
use crate::error::{Error, Result};

const MAGIC: &[u8; 8] = b"IRFLAT01";

/// 文件头长度：magic + dim(u32) + count(u64)
const HEADER_LEN: usize = 8 + 4 + 8;

/// 每个并行任务负责计算的向量数量
const CHUNK_VECTORS: usize = 4096;

/// 暴力搜索的平方欧氏距离索引
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    /// 所有向量按插入顺序平铺存放
    data: Vec<f32>,
}

/// 计算平方欧氏距离
#[inline]
pub fn l2_squared(va: &[f32], vb: &[f32]) -> f32 {
    va.iter().zip(vb).map(|(a, b)| (a - b) * (a - b)).sum()
}

impl FlatIndex {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::ZeroDimension);
        }
        Ok(Self { dim, data: vec![] })
    }

    /// 使用一组向量构建索引，维度取第一条向量的长度
    pub fn build(vectors: &[Embedding]) -> Result<Self> {
        let first = vectors.first().ok_or(Error::EmptyIndex)?;
        let mut index = Self::new(first.len())?;
        index.add(vectors)?;
        Ok(index)
    }

    /// 返回指定位置的向量
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.data.chunks_exact(self.dim).nth(position)
    }

    /// 向量数据的 blake3 摘要，用于校验元数据是否与该索引配套
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.dim as u64).to_le_bytes());
        let mut buffer = Vec::with_capacity(CHUNK_VECTORS * 4);
        for chunk in self.data.chunks(CHUNK_VECTORS) {
            buffer.clear();
            buffer.extend(chunk.iter().flat_map(|v| v.to_le_bytes()));
            hasher.update(&buffer);
        }
        *hasher.finalize().as_bytes()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(self.dim as u32)?;
        writer.write_u64::<LittleEndian>(self.len() as u64)?;
        for &v in &self.data {
            writer.write_f32::<LittleEndian>(v)?;
        }
        Ok(())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingArtifact { path: path.to_path_buf() },
            _ => Error::Io(e),
        })?;
        let corrupt = |reason: String| Error::CorruptIndex { path: path.to_path_buf(), reason };
        let file_len = file.metadata()?.len();

        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).map_err(|e| corrupt(e.to_string()))?;
        if &magic != MAGIC {
            return Err(corrupt("文件头不匹配".to_string()));
        }

        let dim = reader.read_u32::<LittleEndian>().map_err(|e| corrupt(e.to_string()))? as usize;
        let count = reader.read_u64::<LittleEndian>().map_err(|e| corrupt(e.to_string()))?;
        if dim == 0 {
            return Err(corrupt("向量维度为 0".to_string()));
        }
        let total = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(dim))
            .filter(|total| total.checked_mul(4).and_then(|n| n.checked_add(HEADER_LEN)).is_some())
            .ok_or_else(|| corrupt(format!("向量数量异常：{count}")))?;
        // 分配内存前先核对文件长度
        let expected_len = (HEADER_LEN + total * 4) as u64;
        if file_len < expected_len {
            return Err(corrupt(format!("文件被截断，期望 {count} 条 {dim} 维向量")));
        }

        let mut data = vec![0f32; total];
        reader
            .read_f32_into::<LittleEndian>(&mut data)
            .map_err(|_| corrupt(format!("文件被截断，期望 {count} 条 {dim} 维向量")))?;

        // 文件尾部不应该有多余数据
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(corrupt("文件尾部存在多余数据".to_string()));
        }

        Ok(Self { dim, data })
    }
}

impl VectorIndex for FlatIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    fn add(&mut self, vectors: &[Embedding]) -> Result<()> {
        let base = self.len();
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != self.dim) {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: v.len(),
                position: base + i,
            });
        }
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::QueryDimension { expected: self.dim, actual: query.len() });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }

        let distances = self
            .data
            .par_chunks(CHUNK_VECTORS * self.dim)
            .flat_map_iter(|chunk| chunk.chunks_exact(self.dim).map(|v| l2_squared(query, v)))
            .collect::<Vec<_>>();

        let mut neighbors = distances
            .into_iter()
            .enumerate()
            .map(|(position, distance)| Neighbor { position, distance })
            .collect::<Vec<_>>();

        let order = |a: &Neighbor, b: &Neighbor| {
            a.distance.total_cmp(&b.distance).then(a.position.cmp(&b.position))
        };
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, order);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(order);
        Ok(neighbors)
    }
}
