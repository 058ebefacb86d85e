use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use image::DynamicImage;
use log::{debug, info, warn};
use serde::Serialize;
use utoipa::ToSchema;

use crate::IMDB;
use crate::config::ConfDir;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::utils;

/// 排除查询图片本身时额外多取的候选数量
pub const EXCLUDE_HEADROOM: usize = 10;

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchResult {
    /// 商品 ID
    pub product_id: i64,
    /// 图片 ID，按商品去重后为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<i64>,
    /// 命中的图片地址
    pub image_url: String,
    /// 平方欧氏距离
    pub distance: f32,
    /// 相似度，`1 / (1 + distance)`
    pub similarity_score: f32,
}

/// 将距离转换为 (0, 1] 区间内的相似度
pub fn similarity_score(distance: f32) -> f32 {
    1. / (1. + distance)
}

/// 每个商品只保留排名最靠前的一条结果，最多返回 `limit` 条
pub fn deduplicate_by_product(results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.product_id))
        .map(|r| SearchResult { image_id: None, ..r })
        .take(limit)
        .collect()
}

/// 服务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    pub loaded: bool,
    pub indexed_images: usize,
}

/// 图片检索服务
///
/// 持有特征提取器与当前加载的索引。索引可以在运行中整体替换，
/// 正在进行的查询继续使用替换前的索引。
pub struct SearchService<E> {
    embedder: E,
    imdb: RwLock<Option<Arc<IMDB>>>,
}

impl<E: Embedder> SearchService<E> {
    /// 创建一个尚未加载索引的服务
    pub fn new(embedder: E) -> Self {
        Self { embedder, imdb: RwLock::new(None) }
    }

    pub fn with_index(embedder: E, imdb: IMDB) -> Self {
        Self { embedder, imdb: RwLock::new(Some(Arc::new(imdb))) }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// 当前加载的索引
    pub fn current(&self) -> Option<Arc<IMDB>> {
        self.imdb.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 替换当前索引
    pub fn install(&self, imdb: IMDB) {
        let imdb = Arc::new(imdb);
        *self.imdb.write().unwrap_or_else(PoisonError::into_inner) = Some(imdb);
    }

    /// 索引维度必须与特征提取器一致
    pub fn check_dim(&self, imdb: &IMDB) -> Result<()> {
        if imdb.dim() != self.embedder.dim() {
            let (index, embedder) = (imdb.dim(), self.embedder.dim());
            return Err(Error::EmbedderDimension { index, embedder });
        }
        Ok(())
    }

    /// 从配置目录重新加载索引，失败时保留原有索引
    pub fn reload(&self, conf_dir: &ConfDir) -> Result<usize> {
        let imdb = IMDB::open(conf_dir)
            .and_then(|imdb| self.check_dim(&imdb).map(|_| imdb))
            .inspect_err(|e| warn!("重新加载索引失败：{e}"))?;
        let count = imdb.len();
        self.install(imdb);
        info!("索引已重新加载：{count} 条向量");
        Ok(count)
    }

    pub fn health(&self) -> Health {
        match self.current() {
            Some(imdb) => Health { loaded: true, indexed_images: imdb.len() },
            None => Health { loaded: false, indexed_images: 0 },
        }
    }

    /// 搜索与图片最相似的 `top_k` 张商品图片
    ///
    /// 返回的耗时只包含特征提取。`exclude_image_id` 指定的图片不会出现在结果中。
    pub fn search(
        &self,
        image: &DynamicImage,
        top_k: usize,
        exclude_image_id: Option<i64>,
    ) -> Result<(Vec<SearchResult>, Duration)> {
        let imdb = self.current().ok_or(Error::IndexUnavailable)?;

        let start = Instant::now();
        let query = self.embedder.embed(image)?;
        let elapsed = start.elapsed();

        if top_k == 0 {
            return Ok((vec![], elapsed));
        }

        let k = match exclude_image_id {
            Some(_) => top_k.saturating_add(EXCLUDE_HEADROOM),
            None => top_k,
        };
        let neighbors = imdb.index().search(&query, k)?;
        debug!("向量检索返回 {} 条候选", neighbors.len());

        let mut results = Vec::with_capacity(top_k.min(neighbors.len()));
        for neighbor in neighbors {
            let entry = imdb.store().lookup(neighbor.position)?;
            if Some(entry.image_id) == exclude_image_id {
                continue;
            }
            results.push(SearchResult {
                product_id: entry.product_id,
                image_id: Some(entry.image_id),
                image_url: entry.image_url.clone(),
                distance: neighbor.distance,
                similarity_score: similarity_score(neighbor.distance),
            });
            if results.len() == top_k {
                break;
            }
        }

        Ok((results, elapsed))
    }

    /// 解码上传的图片并搜索
    pub fn search_bytes(&self, data: &[u8], top_k: usize) -> Result<(Vec<SearchResult>, Duration)> {
        let image = utils::decode_image(data)?;
        self.search(&image, top_k, None)
    }
}
