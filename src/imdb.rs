use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::{info, warn};

use crate::acquire::ImageSource;
use crate::config::ConfDir;
use crate::db::CatalogImage;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::store::{CatalogStore, IndexEntry};
use crate::utils;

/// 一组配套加载的向量索引与元数据
///
/// 加载完成后不再修改，重新加载时整体替换。
#[derive(Debug)]
pub struct IMDB {
    index: FlatIndex,
    store: CatalogStore,
}

impl IMDB {
    /// 由内存中的索引和元数据组装，二者数量必须一致
    pub fn from_parts(index: FlatIndex, store: CatalogStore) -> Result<Self> {
        if index.len() != store.len() {
            return Err(Error::PairMismatch { vectors: index.len(), entries: store.len() });
        }
        Ok(Self { index, store })
    }

    /// 从配置目录加载索引
    pub fn open(conf_dir: &ConfDir) -> Result<Self> {
        Self::open_paths(conf_dir.vectors(), conf_dir.metadata())
    }

    pub fn open_paths(vectors: impl AsRef<Path>, metadata: impl AsRef<Path>) -> Result<Self> {
        let (vectors, metadata) = (vectors.as_ref(), metadata.as_ref());
        // 先检查两个文件都存在，避免读取了一个大文件后才发现另一个缺失
        for path in [vectors, metadata] {
            if !path.exists() {
                return Err(Error::MissingArtifact { path: path.to_path_buf() });
            }
        }

        info!("加载向量索引: {}", vectors.display());
        let index = FlatIndex::open(vectors)?;
        info!("加载元数据: {}", metadata.display());
        let (store, digest) = CatalogStore::open(metadata)?;

        if index.len() != store.len() {
            return Err(Error::PairMismatch { vectors: index.len(), entries: store.len() });
        }
        if index.digest() != digest {
            return Err(Error::PairDigestMismatch { path: metadata.to_path_buf() });
        }

        info!("索引加载完成：{} 条向量，维度 {}", index.len(), index.dim());
        Ok(Self { index, store })
    }

    /// 保存到配置目录，先写入临时文件再重命名
    ///
    /// 向量文件先于元数据落盘，中途失败时元数据中记录的摘要无法与新向量匹配，
    /// 加载时会被拒绝。
    pub fn save(&self, conf_dir: &ConfDir) -> Result<()> {
        let vectors = conf_dir.vectors();
        let metadata = conf_dir.metadata();
        for path in [&vectors, &metadata] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_vectors = tmp_path(&vectors);
        self.index.save(&tmp_vectors)?;
        fs::rename(&tmp_vectors, &vectors)?;

        let tmp_metadata = tmp_path(&metadata);
        self.store.save(&tmp_metadata, self.index.digest())?;
        fs::rename(&tmp_metadata, &metadata)?;

        info!("索引已保存: {} / {}", vectors.display(), metadata.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 构建结果统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// 成功写入索引的图片数量
    pub indexed: usize,
    /// 获取或特征提取失败而跳过的图片数量
    pub failed: usize,
}

/// 从商品目录构建索引
pub struct IMDBBuilder<'a, E, S> {
    embedder: &'a E,
    source: &'a S,
    progress: bool,
}

impl<'a, E: Embedder, S: ImageSource> IMDBBuilder<'a, E, S> {
    pub fn new(embedder: &'a E, source: &'a S) -> Self {
        Self { embedder, source, progress: true }
    }

    /// 是否显示进度条
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// 依次获取并提取每张图片的特征，失败的图片会被跳过
    pub async fn build(&self, rows: &[CatalogImage]) -> Result<(IMDB, BuildSummary)> {
        let pb = if self.progress {
            ProgressBar::new(rows.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(utils::pb_style());

        let mut vectors = Vec::with_capacity(rows.len());
        let mut entries = Vec::with_capacity(rows.len());
        let mut failed = 0;

        for row in rows {
            match self.embed_row(row).await {
                Ok(vector) => {
                    vectors.push(vector);
                    entries.push(IndexEntry {
                        image_id: row.image_id,
                        product_id: row.product_id,
                        image_url: row.image_url.clone(),
                    });
                }
                Err(e) => {
                    warn!("跳过图片 {}：{e}", row.image_id);
                    failed += 1;
                }
            }
            pb.inc(1);
            pb.set_message(format!("失败 {failed}"));
        }
        pb.finish_and_clear();

        if vectors.is_empty() {
            return Err(Error::EmptyIndex);
        }

        let index = FlatIndex::build(&vectors)?;
        let imdb = IMDB::from_parts(index, CatalogStore::new(entries))?;
        let summary = BuildSummary { indexed: imdb.len(), failed };
        info!("索引构建完成：成功 {}，失败 {}", summary.indexed, summary.failed);
        Ok((imdb, summary))
    }

    async fn embed_row(&self, row: &CatalogImage) -> Result<crate::Embedding> {
        let data = self.source.fetch(&row.image_url).await?;
        let image = utils::decode_image(&data)?;
        self.embedder.embed(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(n: i64) -> CatalogStore {
        CatalogStore::new(
            (0..n)
                .map(|i| IndexEntry { image_id: i, product_id: i / 2, image_url: format!("{i}.png") })
                .collect(),
        )
    }

    #[test]
    fn test_from_parts_count_mismatch() {
        let index = FlatIndex::build(&[vec![0., 0.], vec![1., 0.]]).unwrap();
        assert!(matches!(
            IMDB::from_parts(index, store(3)),
            Err(Error::PairMismatch { vectors: 2, entries: 3 })
        ));
    }

    #[test]
    fn test_save_open() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = ConfDir::new(dir.path());
        let index = FlatIndex::build(&[vec![0., 0.], vec![1., 0.], vec![5., 5.]]).unwrap();
        let imdb = IMDB::from_parts(index, store(3)).unwrap();
        imdb.save(&conf_dir).unwrap();

        let loaded = IMDB::open(&conf_dir).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dim(), 2);
        assert_eq!(loaded.store(), imdb.store());
        assert!(!dir.path().join("index.flat.tmp").exists());
    }

    #[test]
    fn test_open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = ConfDir::new(dir.path());
        assert!(matches!(IMDB::open(&conf_dir), Err(Error::MissingArtifact { .. })));
    }

    #[test]
    fn test_open_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = ConfDir::new(dir.path());
        let index = FlatIndex::build(&[vec![0., 0.], vec![1., 0.]]).unwrap();
        IMDB::from_parts(index, store(2)).unwrap().save(&conf_dir).unwrap();

        // 同样数量但内容不同的向量文件
        let other = FlatIndex::build(&[vec![3., 3.], vec![4., 4.]]).unwrap();
        other.save(conf_dir.vectors()).unwrap();
        assert!(matches!(IMDB::open(&conf_dir), Err(Error::PairDigestMismatch { .. })));
    }
}
