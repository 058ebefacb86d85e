use std::fmt;

use clap::ValueEnum;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// 增强后图片的边长
pub const OUTPUT_SIZE: u32 = 224;

/// RandomResizedCrop 放弃随机采样前的尝试次数
const CROP_ATTEMPTS: usize = 10;

/// 图片增强强度，按强度从低到高排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AugmentPreset {
    None,
    Minimal,
    Ultralight,
    Light,
    Heavy,
}

/// 一种增强强度对应的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    /// 亮度抖动幅度，系数取自 `[1 - x, 1 + x]`
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// 色相偏移幅度，以整圈为单位，偏移取自 `[-x, x]`
    pub hue: f32,
    /// 最大旋转角度
    pub rotation: f32,
    /// 随机裁剪的面积比例范围，为空时不裁剪
    pub crop_scale: Option<(f32, f32)>,
    /// 3x3 高斯模糊的 sigma 范围，为空时不模糊
    pub blur_sigma: Option<(f32, f32)>,
}

impl AugmentPreset {
    pub const ALL: [AugmentPreset; 5] =
        [Self::None, Self::Minimal, Self::Ultralight, Self::Light, Self::Heavy];

    pub fn params(self) -> AugmentParams {
        let none = AugmentParams {
            brightness: 0.,
            contrast: 0.,
            saturation: 0.,
            hue: 0.,
            rotation: 0.,
            crop_scale: None,
            blur_sigma: None,
        };
        match self {
            Self::None => none,
            Self::Minimal => AugmentParams { brightness: 0.02, ..none },
            Self::Ultralight => {
                AugmentParams { brightness: 0.05, contrast: 0.05, rotation: 2., ..none }
            }
            Self::Light => AugmentParams {
                brightness: 0.15,
                contrast: 0.15,
                saturation: 0.1,
                rotation: 5.,
                crop_scale: Some((0.9, 1.)),
                ..none
            },
            Self::Heavy => AugmentParams {
                brightness: 0.3,
                contrast: 0.3,
                saturation: 0.2,
                hue: 0.1,
                rotation: 15.,
                crop_scale: Some((0.75, 1.)),
                blur_sigma: Some((0.1, 2.)),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Ultralight => "ultralight",
            Self::Light => "light",
            Self::Heavy => "heavy",
        }
    }
}

impl fmt::Display for AugmentPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可复现的图片增强器
///
/// 每张图片的随机数种子由运行种子和图片 ID 共同决定，
/// 同一张图片在多次运行中得到相同的增强结果，且与处理顺序无关。
#[derive(Debug, Clone)]
pub struct Augmenter {
    params: AugmentParams,
    seed: u64,
}

impl Augmenter {
    pub fn new(preset: AugmentPreset, seed: u64) -> Self {
        Self { params: preset.params(), seed }
    }

    pub fn params(&self) -> &AugmentParams {
        &self.params
    }

    fn rng_for(&self, image_id: i64) -> StdRng {
        let mixed = self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ image_id as u64;
        StdRng::seed_from_u64(mixed)
    }

    pub fn apply(&self, image: &DynamicImage, image_id: i64) -> DynamicImage {
        let mut rng = self.rng_for(image_id);
        let p = &self.params;
        let mut img = image.to_rgb8();

        if p.brightness > 0. {
            let factor = jitter(&mut rng, p.brightness);
            adjust_brightness(&mut img, factor);
        }
        if p.contrast > 0. {
            let factor = jitter(&mut rng, p.contrast);
            adjust_contrast(&mut img, factor);
        }
        if p.saturation > 0. {
            let factor = jitter(&mut rng, p.saturation);
            adjust_saturation(&mut img, factor);
        }
        if p.hue > 0. {
            let shift = rng.random_range(-p.hue..=p.hue);
            img = imageops::huerotate(&img, (shift * 360.).round() as i32);
        }
        if p.rotation > 0. {
            let angle = rng.random_range(-p.rotation..=p.rotation);
            img = rotate(&img, angle);
        }
        if let Some(scale) = p.crop_scale {
            let (x, y, w, h) = random_crop(&mut rng, img.width(), img.height(), scale);
            img = imageops::crop_imm(&img, x, y, w, h).to_image();
        }

        img = imageops::resize(&img, OUTPUT_SIZE, OUTPUT_SIZE, FilterType::Triangle);

        if let Some((min, max)) = p.blur_sigma {
            let sigma = rng.random_range(min..=max);
            img = gaussian_blur3(&img, sigma);
        }

        DynamicImage::ImageRgb8(img)
    }
}

fn jitter(rng: &mut StdRng, amount: f32) -> f32 {
    rng.random_range((1. - amount).max(0.)..=1. + amount)
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0., 255.) as u8
}

fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

fn adjust_brightness(img: &mut RgbImage, factor: f32) {
    for p in img.pixels_mut() {
        p.0 = p.0.map(|c| clamp_u8(c as f32 * factor));
    }
}

/// 与整张图的平均灰度混合
fn adjust_contrast(img: &mut RgbImage, factor: f32) {
    let count = (img.width() * img.height()).max(1) as f32;
    let mean = img.pixels().map(luma).sum::<f32>() / count;
    for p in img.pixels_mut() {
        p.0 = p.0.map(|c| clamp_u8(mean + (c as f32 - mean) * factor));
    }
}

/// 与像素自身的灰度混合
fn adjust_saturation(img: &mut RgbImage, factor: f32) {
    for p in img.pixels_mut() {
        let gray = luma(p);
        p.0 = p.0.map(|c| clamp_u8(gray + (c as f32 - gray) * factor));
    }
}

/// 一维 3 抽头高斯核，权重和为 1
fn gaussian_kernel3(sigma: f32) -> [f32; 3] {
    let side = (-1. / (2. * sigma * sigma)).exp();
    let sum = 1. + 2. * side;
    [side / sum, 1. / sum, side / sum]
}

/// 3x3 高斯模糊，边缘像素按最近像素延拓
fn gaussian_blur3(img: &RgbImage, sigma: f32) -> RgbImage {
    let kernel = gaussian_kernel3(sigma);
    let (w, h) = img.dimensions();
    let pass = |src: &RgbImage, horizontal: bool| {
        RgbImage::from_fn(w, h, |x, y| {
            let mut acc = [0f32; 3];
            for (offset, weight) in [-1i64, 0, 1].into_iter().zip(kernel) {
                let (sx, sy) = match horizontal {
                    true => ((x as i64 + offset).clamp(0, w as i64 - 1) as u32, y),
                    false => (x, (y as i64 + offset).clamp(0, h as i64 - 1) as u32),
                };
                for (a, v) in acc.iter_mut().zip(src.get_pixel(sx, sy).0) {
                    *a += v as f32 * weight;
                }
            }
            Rgb(acc.map(clamp_u8))
        })
    };
    pass(&pass(img, true), false)
}

/// 绕中心旋转，尺寸不变，超出原图的区域填充黑色
fn rotate(img: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = (w as f32 / 2., h as f32 / 2.);
    RgbImage::from_fn(w, h, |x, y| {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        // 反向映射到原图坐标
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        if sx >= 0. && sy >= 0. && (sx as u32) < w && (sy as u32) < h {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// 按面积比例和 `[3/4, 4/3]` 宽高比随机选取裁剪区域，返回 `(x, y, w, h)`
fn random_crop(rng: &mut StdRng, width: u32, height: u32, (min, max): (f32, f32)) -> (u32, u32, u32, u32) {
    let area = (width * height) as f32;
    let (log_min, log_max) = ((3f32 / 4.).ln(), (4f32 / 3.).ln());

    for _ in 0..CROP_ATTEMPTS {
        let target = area * rng.random_range(min..=max);
        let ratio = rng.random_range(log_min..=log_max).exp();
        let w = (target * ratio).sqrt().round() as u32;
        let h = (target / ratio).sqrt().round() as u32;
        if w > 0 && h > 0 && w <= width && h <= height {
            let x = rng.random_range(0..=width - w);
            let y = rng.random_range(0..=height - h);
            return (x, y, w, h);
        }
    }

    // 采样失败时退回到中心裁剪
    let ratio = width as f32 / height.max(1) as f32;
    let (w, h) = if ratio < 3. / 4. {
        (width, ((width as f32 * 4. / 3.).round() as u32).min(height))
    } else if ratio > 4. / 3. {
        (((height as f32 * 4. / 3.).round() as u32).min(width), height)
    } else {
        (width, height)
    };
    ((width - w) / 2, (height - h) / 2, w, h)
}
