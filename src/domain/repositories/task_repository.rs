// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::task::{DomainError, ScrapeTask, TaskStatus};

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 违反任务状态机
    #[error(transparent)]
    InvalidTransition(#[from] DomainError),
    /// 字段编解码失败
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 各状态任务数量
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub queued: u64,
    pub running: u64,
    pub success: u64,
    pub failed: u64,
}

/// 任务仓库特质
///
/// 定义任务数据访问接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建新任务
    async fn create(&self, task: &ScrapeTask) -> Result<ScrapeTask, RepositoryError>;

    /// 根据ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeTask>, RepositoryError>;

    /// 推进任务状态
    ///
    /// 只允许向前转换；`error` 仅在转为 Failed 时写入。
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeTask)` - 更新后的任务
    /// * `Err(RepositoryError::NotFound)` - 任务不存在
    /// * `Err(RepositoryError::InvalidTransition)` - 状态回退或离开终态
    async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<ScrapeTask, RepositoryError>;

    /// 按状态统计任务数
    async fn stats(&self) -> Result<TaskStats, RepositoryError>;
}

#[async_trait]
impl<T: TaskRepository + ?Sized> TaskRepository for Arc<T> {
    async fn create(&self, task: &ScrapeTask) -> Result<ScrapeTask, RepositoryError> {
        (**self).create(task).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeTask>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<ScrapeTask, RepositoryError> {
        (**self).update_status(id, status, error).await
    }

    async fn stats(&self) -> Result<TaskStats, RepositoryError> {
        (**self).stats().await
    }
}
