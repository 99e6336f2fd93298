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

use crate::domain::models::task::{ScrapeTask, TaskStatus};
use crate::domain::repositories::task_repository::{RepositoryError, TaskRepository, TaskStats};
use crate::infrastructure::database::entities::scrape_task as task_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 任务仓库实现
///
/// 基于SeaORM实现的任务数据访问层
#[derive(Clone)]
pub struct TaskRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl TaskRepositoryImpl {
    /// 创建新的任务仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn count_status(&self, status: TaskStatus) -> Result<u64, RepositoryError> {
        Ok(task_entity::Entity::find()
            .filter(task_entity::Column::Status.eq(status.to_string()))
            .count(self.db.as_ref())
            .await?)
    }
}

impl From<task_entity::Model> for ScrapeTask {
    fn from(model: task_entity::Model) -> Self {
        Self {
            id: model.id,
            asin: model.asin,
            marketplace: model.marketplace,
            status: model.status.parse().unwrap_or(TaskStatus::Failed),
            error: model.error,
            requested_by: model.requested_by,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<&ScrapeTask> for task_entity::ActiveModel {
    fn from(task: &ScrapeTask) -> Self {
        Self {
            id: Set(task.id),
            asin: Set(task.asin.clone()),
            marketplace: Set(task.marketplace.clone()),
            status: Set(task.status.to_string()),
            error: Set(task.error.clone()),
            requested_by: Set(task.requested_by.clone()),
            created_at: Set(task.created_at.into()),
            updated_at: Set(task.updated_at.into()),
        }
    }
}

#[async_trait]
impl TaskRepository for TaskRepositoryImpl {
    async fn create(&self, task: &ScrapeTask) -> Result<ScrapeTask, RepositoryError> {
        let model: task_entity::ActiveModel = task.into();
        let inserted = model.insert(self.db.as_ref()).await?;
        Ok(inserted.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeTask>, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<ScrapeTask, RepositoryError> {
        let model = task_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;

        // 状态机校验在领域模型中完成，终态任务不会被复活
        let task = ScrapeTask::from(model.clone()).transition(status, error)?;

        let mut active: task_entity::ActiveModel = model.into();
        active.status = Set(task.status.to_string());
        active.error = Set(task.error.clone());
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(self.db.as_ref()).await?;
        Ok(updated.into())
    }

    async fn stats(&self) -> Result<TaskStats, RepositoryError> {
        Ok(TaskStats {
            queued: self.count_status(TaskStatus::Queued).await?,
            running: self.count_status(TaskStatus::Running).await?,
            success: self.count_status(TaskStatus::Success).await?,
            failed: self.count_status(TaskStatus::Failed).await?,
        })
    }
}
