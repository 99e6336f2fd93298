// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::task_repository::RepositoryError;
use crate::domain::models::asset::AssetRole;
use crate::domain::models::product::{
    DerivedCollections, ItemKey, ProductRecord, ProductStatus, VolatileFields,
};

/// 商品统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductStats {
    pub total: u64,
    pub fresh: u64,
    pub stale: u64,
    pub failed: u64,
    pub pending: u64,
    pub assets_stored: u64,
}

/// 商品仓库特质
///
/// 所有涉及从属集合的写操作都必须在单个事务内完成，
/// 使从属集合始终与记录上的结构摘要一致。
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// 按 (asin, marketplace) 查找记录
    async fn find_by_key(&self, key: &ItemKey) -> Result<Option<ProductRecord>, RepositoryError>;

    /// 插入新记录及全部从属集合
    async fn insert_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<Uuid, RepositoryError>;

    /// 更新核心字段并整体替换从属集合
    ///
    /// 旧的 bullets、属性与图片行全部删除后重新插入。
    async fn replace_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<(), RepositoryError>;

    /// 只更新易变字段与抓取时间，不触碰从属集合
    async fn touch_volatile(
        &self,
        id: Uuid,
        volatile: &VolatileFields,
    ) -> Result<(), RepositoryError>;

    /// 读取记录的从属集合
    async fn find_derived(&self, id: Uuid) -> Result<DerivedCollections, RepositoryError>;

    /// 上传确认后写入存储路径，按角色与位置寻址
    async fn set_asset_stored(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
        storage_path: &str,
    ) -> Result<(), RepositoryError>;

    /// 标记图片镜像失败
    async fn set_asset_failed(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
    ) -> Result<(), RepositoryError>;

    /// 更新记录状态，记录不存在时忽略
    async fn set_status(&self, key: &ItemKey, status: ProductStatus)
        -> Result<(), RepositoryError>;

    /// 统计
    async fn stats(&self) -> Result<ProductStats, RepositoryError>;
}

#[async_trait]
impl<T: ProductRepository + ?Sized> ProductRepository for Arc<T> {
    async fn find_by_key(&self, key: &ItemKey) -> Result<Option<ProductRecord>, RepositoryError> {
        (**self).find_by_key(key).await
    }

    async fn insert_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<Uuid, RepositoryError> {
        (**self).insert_with_derived(record, derived).await
    }

    async fn replace_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<(), RepositoryError> {
        (**self).replace_with_derived(record, derived).await
    }

    async fn touch_volatile(
        &self,
        id: Uuid,
        volatile: &VolatileFields,
    ) -> Result<(), RepositoryError> {
        (**self).touch_volatile(id, volatile).await
    }

    async fn find_derived(&self, id: Uuid) -> Result<DerivedCollections, RepositoryError> {
        (**self).find_derived(id).await
    }

    async fn set_asset_stored(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
        storage_path: &str,
    ) -> Result<(), RepositoryError> {
        (**self).set_asset_stored(id, role, position, storage_path).await
    }

    async fn set_asset_failed(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
    ) -> Result<(), RepositoryError> {
        (**self).set_asset_failed(id, role, position).await
    }

    async fn set_status(
        &self,
        key: &ItemKey,
        status: ProductStatus,
    ) -> Result<(), RepositoryError> {
        (**self).set_status(key, status).await
    }

    async fn stats(&self) -> Result<ProductStats, RepositoryError> {
        (**self).stats().await
    }
}
