use image::DynamicImage;
use image::imageops::FilterType;

use crate::Embedding;
use crate::error::{Error, Result};

/// 将图片映射为定长向量的特征提取器
pub trait Embedder: Send + Sync {
    /// 模型标识，写入基准测试报告
    fn name(&self) -> &str;

    /// 推理设备标识
    fn device(&self) -> &str {
        "cpu"
    }

    /// 输出向量维度
    fn dim(&self) -> usize;

    fn embed(&self, image: &DynamicImage) -> Result<Embedding>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn device(&self) -> &str {
        (**self).device()
    }

    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn embed(&self, image: &DynamicImage) -> Result<Embedding> {
        (**self).embed(image)
    }
}

/// 缩略图特征
///
/// 将图片缩放为 `side x side` 的 RGB 缩略图，展平后做 L2 归一化。
/// 结果只取决于像素内容，适合作为没有部署视觉模型时的基线。
#[derive(Debug, Clone)]
pub struct ThumbnailEmbedder {
    side: u32,
    name: String,
}

impl ThumbnailEmbedder {
    pub fn new(side: u32) -> Self {
        Self { side, name: format!("thumbnail-{side}x{side}-rgb") }
    }
}

impl Default for ThumbnailEmbedder {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Embedder for ThumbnailEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        (self.side * self.side * 3) as usize
    }

    fn embed(&self, image: &DynamicImage) -> Result<Embedding> {
        if self.side == 0 {
            return Err(Error::Embedding("缩略图尺寸不能为 0".to_string()));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Embedding(format!(
                "图片尺寸无效：{}x{}",
                image.width(),
                image.height()
            )));
        }

        let thumb = image.resize_exact(self.side, self.side, FilterType::Triangle).to_rgb8();
        let mut vector = thumb.into_raw().into_iter().map(|v| v as f32 / 255.).collect::<Vec<_>>();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}
