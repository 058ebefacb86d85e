use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 元数据文件格式版本，修改 `IndexEntry` 结构时需要递增
pub const METADATA_FORMAT_VERSION: u32 = 1;

/// 索引中一条向量对应的商品图片信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub image_id: i64,
    pub product_id: i64,
    pub image_url: String,
}

/// 与向量索引按位置一一对应的元数据表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStore {
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct MetadataFileRef<'a> {
    format_version: u32,
    vectors_digest: [u8; 32],
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct MetadataFile {
    format_version: u32,
    vectors_digest: [u8; 32],
    entries: Vec<IndexEntry>,
}

impl CatalogStore {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    pub fn lookup(&self, position: usize) -> Result<&IndexEntry> {
        self.entries.get(position).ok_or(Error::OutOfRange { position, len: self.entries.len() })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// 保存元数据，`vectors_digest` 为配套向量索引的摘要
    pub fn save(&self, path: impl AsRef<Path>, vectors_digest: [u8; 32]) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let metadata = MetadataFileRef {
            format_version: METADATA_FORMAT_VERSION,
            vectors_digest,
            entries: &self.entries,
        };
        bincode::serialize_into(&mut writer, &metadata)?;
        writer.flush()?;
        Ok(())
    }

    /// 读取元数据，返回元数据表和其记录的向量索引摘要
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, [u8; 32])> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingArtifact { path: path.to_path_buf() },
            _ => Error::Io(e),
        })?;
        let metadata: MetadataFile = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::CorruptIndex { path: path.to_path_buf(), reason: e.to_string() })?;
        if metadata.format_version != METADATA_FORMAT_VERSION {
            return Err(Error::CorruptIndex {
                path: path.to_path_buf(),
                reason: format!(
                    "元数据版本为 {}，当前支持的版本为 {METADATA_FORMAT_VERSION}",
                    metadata.format_version
                ),
            });
        }
        Ok((Self::new(metadata.entries), metadata.vectors_digest))
    }
}
