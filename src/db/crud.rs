use sqlx::{Executor, Result, Sqlite};

use super::CatalogImage;

/// 按图片 ID 顺序列出在售商品的图片，`limit` 为空时返回全部
pub async fn list_catalog_images<'c, E>(executor: E, limit: Option<i64>) -> Result<Vec<CatalogImage>>
where
    E: Executor<'c, Database = Sqlite>,
{
    // SQLite 中 LIMIT -1 表示不限制
    let limit = limit.unwrap_or(-1);
    sqlx::query_as::<_, CatalogImage>(
        r#"
        SELECT
            pi.id AS image_id,
            pi.image_url AS image_url,
            pv.product_id AS product_id,
            c.name AS category
        FROM product_images pi
        INNER JOIN product_variants pv ON pi.variant_id = pv.id
        INNER JOIN products p ON pv.product_id = p.id
        LEFT JOIN categories c ON p.category_id = c.id
        WHERE pv.deleted_at IS NULL
          AND p.status = 'active'
          AND p.deleted_at IS NULL
        ORDER BY pi.id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await
}
