#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};

/// 每个商品使用一种主色，颜色之间差异足够大
pub const PALETTE: [[u8; 3]; 3] = [[220, 40, 40], [40, 200, 60], [50, 60, 210]];

/// 带有轻微渐变的纯色图片，`variant` 越大渐变越明显
pub fn solid_image(color: [u8; 3], variant: u32) -> RgbImage {
    RgbImage::from_fn(32, 32, |x, y| {
        let shift = ((x + y) * variant / 8) as u8;
        Rgb(color.map(|c| c.saturating_sub(shift)))
    })
}

pub fn png_bytes(image: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// 图片文件名，`product` 为商品序号，`index` 为该商品下的图片序号
pub fn image_name(product: usize, index: usize) -> String {
    format!("p{product}_{index}.png")
}

/// 创建商品目录数据库并建表
pub async fn create_db(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let db = SqlitePool::connect_with(options).await.unwrap();
    sqlx::migrate!().run(&db).await.unwrap();
    db
}

pub async fn add_category(db: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("INSERT INTO categories (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(db)
        .await
        .unwrap()
}

pub async fn add_product(
    db: &SqlitePool,
    name: &str,
    category_id: Option<i64>,
    status: &str,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO products (name, category_id, status) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(category_id)
    .bind(status)
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn add_variant(db: &SqlitePool, product_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO product_variants (product_id) VALUES (?) RETURNING id",
    )
    .bind(product_id)
    .fetch_one(db)
    .await
    .unwrap()
}

pub async fn add_image(db: &SqlitePool, variant_id: i64, image_url: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO product_images (variant_id, image_url) VALUES (?, ?) RETURNING id",
    )
    .bind(variant_id)
    .bind(image_url)
    .fetch_one(db)
    .await
    .unwrap()
}

/// 软删除商品规格
pub async fn delete_variant(db: &SqlitePool, variant_id: i64) {
    sqlx::query("UPDATE product_variants SET deleted_at = datetime('now') WHERE id = ?")
        .bind(variant_id)
        .execute(db)
        .await
        .unwrap();
}

/// 在 `root` 下生成商品图片和商品目录数据库，返回数据库路径
pub async fn create_catalog(root: &Path, products: usize, per_product: usize) -> PathBuf {
    let db_path = root.join("catalog.db");
    let db = create_db(&db_path).await;
    let category = add_category(&db, "fixtures").await;
    for p in 0..products {
        let product_id = add_product(&db, &format!("product-{p}"), Some(category), "active").await;
        let variant = add_variant(&db, product_id).await;
        for i in 0..per_product {
            let name = image_name(p, i);
            solid_image(PALETTE[p % PALETTE.len()], i as u32).save(root.join(&name)).unwrap();
            add_image(&db, variant, &name).await;
        }
    }
    db.close().await;
    db_path
}
