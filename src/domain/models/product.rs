// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::{AssetRecord, AssetRole};

/// 抓取目标键：(ASIN, 站点)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub asin: String,
    pub marketplace: String,
}

impl ItemKey {
    pub fn new(asin: impl Into<String>, marketplace: impl Into<String>) -> Self {
        Self {
            asin: asin.into(),
            marketplace: marketplace.into(),
        }
    }

    /// 商品详情页地址
    pub fn product_url(&self) -> String {
        format!("https://{}/dp/{}", self.marketplace, self.asin)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.asin, self.marketplace)
    }
}

/// 价格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

/// 页面中的图片引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub position: i32,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub alt_text: Option<String>,
}

impl ImageRef {
    pub fn new(url: impl Into<String>, position: i32) -> Self {
        Self {
            url: url.into(),
            position,
            width: None,
            height: None,
            alt_text: None,
        }
    }

    fn to_asset(&self, role: AssetRole) -> AssetRecord {
        AssetRecord {
            width: self.width,
            height: self.height,
            alt_text: self.alt_text.clone(),
            ..AssetRecord::pending(role, self.position, self.url.clone())
        }
    }
}

/// 商品属性来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    TechDetails,
    ProductInformation,
}

impl AttributeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeSource::TechDetails => "tech_details",
            AttributeSource::ProductInformation => "product_information",
        }
    }
}

impl FromStr for AttributeSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tech_details" => Ok(AttributeSource::TechDetails),
            "product_information" => Ok(AttributeSource::ProductInformation),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub value: String,
    pub source: AttributeSource,
}

/// 单次成功提取的商品快照
///
/// 所有字段都允许缺失：解析不到的字段为 `None` 或空集合，
/// 不会中断提取。快照只被变更检测消费一次，不会原样持久化。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// 缺失表示标题区块不存在
    pub title: Option<String>,
    /// 0.0 - 5.0，缺失表示无评分
    pub rating: Option<f64>,
    pub ratings_count: Option<i32>,
    /// 缺失表示无货或价格区块不可见
    pub price: Option<Price>,
    pub availability: Option<String>,
    /// 主图，位置固定为 0
    pub hero_image: Option<ImageRef>,
    /// 画廊图，位置从 1 开始
    pub gallery: Vec<ImageRef>,
    pub bullets: Vec<String>,
    pub attributes: Vec<ProductAttribute>,
    /// 类目名 -> 排名
    pub best_sellers_rank: BTreeMap<String, i64>,
    pub aplus_images: Vec<ImageRef>,
    /// 截断后的原始页面
    pub raw_html: Option<String>,
}

impl ProductSnapshot {
    /// 快照中所有需要镜像的图片
    pub fn asset_records(&self) -> Vec<AssetRecord> {
        let mut assets = Vec::with_capacity(1 + self.gallery.len() + self.aplus_images.len());
        if let Some(hero) = &self.hero_image {
            assets.push(hero.to_asset(AssetRole::Hero));
        }
        assets.extend(self.gallery.iter().map(|img| img.to_asset(AssetRole::Gallery)));
        assets.extend(self.aplus_images.iter().map(|img| img.to_asset(AssetRole::Aplus)));
        assets
    }

    pub fn volatile_fields(&self) -> VolatileFields {
        VolatileFields {
            rating: self.rating,
            ratings_count: self.ratings_count,
            price_amount: self.price.as_ref().map(|p| p.amount),
            price_currency: self.price.as_ref().map(|p| p.currency.clone()),
            availability: self.availability.clone(),
            best_sellers_rank: self.best_sellers_rank.clone(),
        }
    }

    pub fn derived_collections(&self) -> DerivedCollections {
        DerivedCollections {
            bullets: self.bullets.clone(),
            attributes: self.attributes.clone(),
            assets: self.asset_records(),
        }
    }
}

/// 商品记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Pending,
    Fresh,
    Stale,
    Failed,
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProductStatus::Pending => write!(f, "pending"),
            ProductStatus::Fresh => write!(f, "fresh"),
            ProductStatus::Stale => write!(f, "stale"),
            ProductStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProductStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProductStatus::Pending),
            "fresh" => Ok(ProductStatus::Fresh),
            "stale" => Ok(ProductStatus::Stale),
            "failed" => Ok(ProductStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 频繁变化、不参与结构摘要的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatileFields {
    pub rating: Option<f64>,
    pub ratings_count: Option<i32>,
    pub price_amount: Option<f64>,
    pub price_currency: Option<String>,
    pub availability: Option<String>,
    pub best_sellers_rank: BTreeMap<String, i64>,
}

/// 商品的从属集合，摘要变化时整体替换
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedCollections {
    pub bullets: Vec<String>,
    pub attributes: Vec<ProductAttribute>,
    pub assets: Vec<AssetRecord>,
}

impl DerivedCollections {
    /// 从属行总数
    pub fn row_count(&self) -> usize {
        self.bullets.len() + self.attributes.len() + self.assets.len()
    }
}

/// 持久化的商品记录，(asin, marketplace) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: Uuid,
    pub asin: String,
    pub marketplace: String,
    pub title: Option<String>,
    #[serde(flatten)]
    pub volatile: VolatileFields,
    pub structural_digest: String,
    pub status: ProductStatus,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRecord {
    /// 由新快照构造一条待插入的记录
    pub fn from_snapshot(key: &ItemKey, snapshot: &ProductSnapshot, digest: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asin: key.asin.clone(),
            marketplace: key.marketplace.clone(),
            title: snapshot.title.clone(),
            volatile: snapshot.volatile_fields(),
            structural_digest: digest.to_string(),
            status: ProductStatus::Fresh,
            last_scraped_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.asin.clone(), self.marketplace.clone())
    }
}
