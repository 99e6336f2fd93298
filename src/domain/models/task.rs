// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::product::ItemKey;

/// 抓取任务实体
///
/// 在请求入队时创建，之后只由处理它的工作器修改。
/// 状态只能向前推进：Queued → Running → Success/Failed。
/// 未能入队的任务直接从 Queued 进入 Failed。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeTask {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 商品 ASIN
    pub asin: String,
    /// 站点域名，例如 `amazon.co.jp`
    pub marketplace: String,
    /// 任务状态
    pub status: TaskStatus,
    /// 终态失败时的最后一次错误
    pub error: Option<String>,
    /// 请求来源
    pub requested_by: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 任务状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已入队
    #[default]
    Queued,
    /// 正在被某个工作器处理
    Running,
    /// 处理成功（包括因记录仍新鲜而跳过）
    Success,
    /// 两层重试均耗尽
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    /// 判断能否从当前状态转换到 `next`
    ///
    /// 终态不可离开，状态不能回退。
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Success)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ScrapeTask {
    /// 创建一个新的抓取任务
    ///
    /// # 参数
    ///
    /// * `key` - 抓取目标
    /// * `requested_by` - 请求来源，可选
    ///
    /// # 返回值
    ///
    /// 返回处于 Queued 状态的新任务
    pub fn new(key: &ItemKey, requested_by: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asin: key.asin.clone(),
            marketplace: key.marketplace.clone(),
            status: TaskStatus::Queued,
            error: None,
            requested_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.asin.clone(), self.marketplace.clone())
    }

    /// 将任务推进到 `next` 状态
    ///
    /// # 返回值
    ///
    /// * `Ok(ScrapeTask)` - 转换后的任务
    /// * `Err(DomainError)` - 转换不合法（回退或离开终态）
    pub fn transition(mut self, next: TaskStatus, error: Option<String>) -> Result<Self, DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == TaskStatus::Failed {
            self.error = error;
        }
        self.updated_at = Utc::now();
        Ok(self)
    }

    /// 开始处理
    pub fn start(self) -> Result<Self, DomainError> {
        self.transition(TaskStatus::Running, None)
    }

    /// 成功完成
    pub fn complete(self) -> Result<Self, DomainError> {
        self.transition(TaskStatus::Success, None)
    }

    /// 记录终态失败，只保留最后一次错误
    pub fn fail(self, error: impl Into<String>) -> Result<Self, DomainError> {
        self.transition(TaskStatus::Failed, Some(error.into()))
    }
}
