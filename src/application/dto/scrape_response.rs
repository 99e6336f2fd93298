// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::models::asset::AssetRecord;
use crate::domain::models::product::{DerivedCollections, ProductAttribute, ProductRecord};
use crate::domain::models::task::{ScrapeTask, TaskStatus};
use crate::domain::repositories::product_repository::ProductStats;
use crate::domain::repositories::task_repository::TaskStats;

#[derive(Debug, Clone, Serialize)]
pub struct TaskDto {
    pub id: Uuid,
    pub asin: String,
    pub marketplace: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ScrapeTask> for TaskDto {
    fn from(task: ScrapeTask) -> Self {
        Self {
            id: task.id,
            asin: task.asin,
            marketplace: task.marketplace,
            status: task.status,
            error: task.error,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponseDto {
    pub tasks: Vec<TaskDto>,
}

/// 商品详情：记录本身加派生集合
#[derive(Debug, Serialize)]
pub struct ProductResponseDto {
    #[serde(flatten)]
    pub record: ProductRecord,
    pub bullets: Vec<String>,
    pub attributes: Vec<ProductAttribute>,
    pub assets: Vec<AssetRecord>,
    /// 本次请求是否触发了后台刷新
    pub refreshing: bool,
    pub task_id: Option<Uuid>,
}

impl ProductResponseDto {
    pub fn new(
        record: ProductRecord,
        derived: DerivedCollections,
        refreshing: bool,
        task_id: Option<Uuid>,
    ) -> Self {
        Self {
            record,
            bullets: derived.bullets,
            attributes: derived.attributes,
            assets: derived.assets,
            refreshing,
            task_id,
        }
    }
}

/// 记录尚不可用时返回 202
#[derive(Debug, Serialize)]
pub struct PendingProductDto {
    pub asin: String,
    pub marketplace: String,
    pub task_id: Option<Uuid>,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponseDto {
    pub queue_size: usize,
    pub active_workers: usize,
    pub sessions_open: usize,
    pub session_capacity: usize,
    pub products: ProductStats,
    pub tasks: TaskStats,
}
