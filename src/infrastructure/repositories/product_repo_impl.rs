// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::domain::models::asset::{AssetRecord, AssetRole, AssetStatus};
use crate::domain::models::product::{
    AttributeSource, DerivedCollections, ItemKey, ProductAttribute, ProductRecord, ProductStatus,
    VolatileFields,
};
use crate::domain::repositories::product_repository::{ProductRepository, ProductStats};
use crate::domain::repositories::task_repository::RepositoryError;
use crate::infrastructure::database::entities::{
    product as product_entity, product_asset as asset_entity,
    product_attribute as attribute_entity, product_bullet as bullet_entity,
};

/// 商品仓库实现
///
/// 商品行与派生集合（要点、属性、图片）的写入在同一事务内完成
#[derive(Clone)]
pub struct ProductRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ProductRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn count_status(&self, status: ProductStatus) -> Result<u64, RepositoryError> {
        Ok(product_entity::Entity::find()
            .filter(product_entity::Column::Status.eq(status.to_string()))
            .count(self.db.as_ref())
            .await?)
    }
}

fn rank_to_json(rank: &BTreeMap<String, i64>) -> Result<Option<serde_json::Value>, RepositoryError> {
    if rank.is_empty() {
        return Ok(None);
    }
    serde_json::to_value(rank)
        .map(Some)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn rank_from_json(value: Option<serde_json::Value>) -> BTreeMap<String, i64> {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn to_active(record: &ProductRecord) -> Result<product_entity::ActiveModel, RepositoryError> {
    let last_scraped = record.last_scraped_at.unwrap_or(record.updated_at);
    Ok(product_entity::ActiveModel {
        id: Set(record.id),
        asin: Set(record.asin.clone()),
        marketplace: Set(record.marketplace.clone()),
        title: Set(record.title.clone()),
        rating: Set(record.volatile.rating),
        ratings_count: Set(record.volatile.ratings_count),
        price_amount: Set(record.volatile.price_amount),
        price_currency: Set(record.volatile.price_currency.clone()),
        availability: Set(record.volatile.availability.clone()),
        best_sellers_rank: Set(rank_to_json(&record.volatile.best_sellers_rank)?),
        structural_digest: Set(record.structural_digest.clone()),
        status: Set(record.status.to_string()),
        last_scraped_at: Set(last_scraped.into()),
        created_at: Set(record.created_at.into()),
        updated_at: Set(record.updated_at.into()),
    })
}

impl From<product_entity::Model> for ProductRecord {
    fn from(model: product_entity::Model) -> Self {
        Self {
            id: model.id,
            asin: model.asin,
            marketplace: model.marketplace,
            title: model.title,
            volatile: VolatileFields {
                rating: model.rating,
                ratings_count: model.ratings_count,
                price_amount: model.price_amount,
                price_currency: model.price_currency,
                availability: model.availability,
                best_sellers_rank: rank_from_json(model.best_sellers_rank),
            },
            structural_digest: model.structural_digest,
            status: model.status.parse().unwrap_or_default(),
            last_scraped_at: Some(model.last_scraped_at.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<asset_entity::Model> for AssetRecord {
    fn from(model: asset_entity::Model) -> Self {
        Self {
            role: model.role.parse().unwrap_or(AssetRole::Gallery),
            position: model.position,
            source_url: model.source_url,
            width: model.width,
            height: model.height,
            alt_text: model.alt_text,
            storage_path: model.storage_path,
            status: model.status.parse().unwrap_or_default(),
        }
    }
}

/// 写入派生集合，调用方负责事务
async fn insert_derived<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    derived: &DerivedCollections,
) -> Result<(), RepositoryError> {
    if !derived.bullets.is_empty() {
        let bullets = derived
            .bullets
            .iter()
            .enumerate()
            .map(|(idx, text)| bullet_entity::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                position: Set(idx as i32),
                text: Set(text.clone()),
            });
        bullet_entity::Entity::insert_many(bullets).exec(conn).await?;
    }

    if !derived.attributes.is_empty() {
        let attributes = derived
            .attributes
            .iter()
            .map(|attr| attribute_entity::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                name: Set(attr.name.clone()),
                value: Set(Some(attr.value.clone())),
                source: Set(attr.source.as_str().to_string()),
            });
        attribute_entity::Entity::insert_many(attributes)
            .exec(conn)
            .await?;
    }

    if !derived.assets.is_empty() {
        let assets = derived.assets.iter().map(|asset| asset_entity::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            role: Set(asset.role.as_str().to_string()),
            position: Set(asset.position),
            source_url: Set(asset.source_url.clone()),
            width: Set(asset.width),
            height: Set(asset.height),
            alt_text: Set(asset.alt_text.clone()),
            storage_path: Set(asset.storage_path.clone()),
            status: Set(asset.status.to_string()),
        });
        asset_entity::Entity::insert_many(assets).exec(conn).await?;
    }

    Ok(())
}

async fn delete_derived<C: ConnectionTrait>(conn: &C, product_id: Uuid) -> Result<(), RepositoryError> {
    bullet_entity::Entity::delete_many()
        .filter(bullet_entity::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    attribute_entity::Entity::delete_many()
        .filter(attribute_entity::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    asset_entity::Entity::delete_many()
        .filter(asset_entity::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[async_trait]
impl ProductRepository for ProductRepositoryImpl {
    async fn find_by_key(&self, key: &ItemKey) -> Result<Option<ProductRecord>, RepositoryError> {
        let model = product_entity::Entity::find()
            .filter(product_entity::Column::Asin.eq(key.asin.as_str()))
            .filter(product_entity::Column::Marketplace.eq(key.marketplace.as_str()))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn insert_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<Uuid, RepositoryError> {
        let txn = self.db.begin().await?;

        to_active(record)?.insert(&txn).await?;
        insert_derived(&txn, record.id, derived).await?;

        txn.commit().await?;
        Ok(record.id)
    }

    async fn replace_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;

        let mut active = to_active(record)?;
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        delete_derived(&txn, record.id).await?;
        insert_derived(&txn, record.id, derived).await?;

        txn.commit().await?;
        Ok(())
    }

    async fn touch_volatile(
        &self,
        id: Uuid,
        volatile: &VolatileFields,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let result = product_entity::Entity::update_many()
            .col_expr(product_entity::Column::Rating, Expr::value(volatile.rating))
            .col_expr(
                product_entity::Column::RatingsCount,
                Expr::value(volatile.ratings_count),
            )
            .col_expr(
                product_entity::Column::PriceAmount,
                Expr::value(volatile.price_amount),
            )
            .col_expr(
                product_entity::Column::PriceCurrency,
                Expr::value(volatile.price_currency.clone()),
            )
            .col_expr(
                product_entity::Column::Availability,
                Expr::value(volatile.availability.clone()),
            )
            .col_expr(
                product_entity::Column::BestSellersRank,
                Expr::value(rank_to_json(&volatile.best_sellers_rank)?),
            )
            .col_expr(
                product_entity::Column::Status,
                Expr::value(ProductStatus::Fresh.to_string()),
            )
            .col_expr(product_entity::Column::LastScrapedAt, Expr::value(now))
            .col_expr(product_entity::Column::UpdatedAt, Expr::value(now))
            .filter(product_entity::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_derived(&self, id: Uuid) -> Result<DerivedCollections, RepositoryError> {
        let bullets = bullet_entity::Entity::find()
            .filter(bullet_entity::Column::ProductId.eq(id))
            .order_by_asc(bullet_entity::Column::Position)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|m| m.text)
            .collect();

        let attributes = attribute_entity::Entity::find()
            .filter(attribute_entity::Column::ProductId.eq(id))
            .order_by_asc(attribute_entity::Column::Source)
            .order_by_asc(attribute_entity::Column::Name)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|m| ProductAttribute {
                name: m.name,
                value: m.value.unwrap_or_default(),
                source: m.source.parse().unwrap_or(AttributeSource::ProductInformation),
            })
            .collect();

        let mut assets: Vec<AssetRecord> = asset_entity::Entity::find()
            .filter(asset_entity::Column::ProductId.eq(id))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        assets.sort_by_key(|a| (a.role, a.position));

        Ok(DerivedCollections {
            bullets,
            attributes,
            assets,
        })
    }

    async fn set_asset_stored(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
        storage_path: &str,
    ) -> Result<(), RepositoryError> {
        let result = asset_entity::Entity::update_many()
            .col_expr(
                asset_entity::Column::StoragePath,
                Expr::value(Some(storage_path.to_string())),
            )
            .col_expr(
                asset_entity::Column::Status,
                Expr::value(AssetStatus::Stored.to_string()),
            )
            .filter(asset_entity::Column::ProductId.eq(id))
            .filter(asset_entity::Column::Role.eq(role.as_str()))
            .filter(asset_entity::Column::Position.eq(position))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn set_asset_failed(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
    ) -> Result<(), RepositoryError> {
        asset_entity::Entity::update_many()
            .col_expr(
                asset_entity::Column::Status,
                Expr::value(AssetStatus::Failed.to_string()),
            )
            .filter(asset_entity::Column::ProductId.eq(id))
            .filter(asset_entity::Column::Role.eq(role.as_str()))
            .filter(asset_entity::Column::Position.eq(position))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        key: &ItemKey,
        status: ProductStatus,
    ) -> Result<(), RepositoryError> {
        product_entity::Entity::update_many()
            .col_expr(product_entity::Column::Status, Expr::value(status.to_string()))
            .col_expr(product_entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_entity::Column::Asin.eq(key.asin.as_str()))
            .filter(product_entity::Column::Marketplace.eq(key.marketplace.as_str()))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<ProductStats, RepositoryError> {
        let total = product_entity::Entity::find()
            .count(self.db.as_ref())
            .await?;
        let assets_stored = asset_entity::Entity::find()
            .filter(asset_entity::Column::Status.eq(AssetStatus::Stored.to_string()))
            .count(self.db.as_ref())
            .await?;

        Ok(ProductStats {
            total,
            fresh: self.count_status(ProductStatus::Fresh).await?,
            stale: self.count_status(ProductStatus::Stale).await?,
            failed: self.count_status(ProductStatus::Failed).await?,
            pending: self.count_status(ProductStatus::Pending).await?,
            assets_stored,
        })
    }
}
