// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub asin: String,
    pub marketplace: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,
    pub rating: Option<f64>,
    pub ratings_count: Option<i32>,
    pub price_amount: Option<f64>,
    pub price_currency: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub availability: Option<String>,
    pub best_sellers_rank: Option<Json>,
    pub structural_digest: String,
    pub status: String,
    pub last_scraped_at: ChronoDateTimeWithTimeZone,
    pub created_at: ChronoDateTimeWithTimeZone,
    pub updated_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_bullet::Entity")]
    Bullets,
    #[sea_orm(has_many = "super::product_attribute::Entity")]
    Attributes,
    #[sea_orm(has_many = "super::product_asset::Entity")]
    Assets,
}

impl Related<super::product_bullet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bullets.def()
    }
}

impl Related<super::product_attribute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attributes.def()
    }
}

impl Related<super::product_asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
