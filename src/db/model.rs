use sqlx::FromRow;

/// 商品目录中的一张在售商品图片
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CatalogImage {
    /// 图片 ID
    pub image_id: i64,
    /// 图片地址，可以是 URL 或本地路径
    pub image_url: String,
    /// 所属商品 ID
    pub product_id: i64,
    /// 商品分类名称
    pub category: Option<String>,
}
