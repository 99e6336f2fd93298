// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::task_repository::RepositoryError;
use crate::engines::traits::EngineError;

/// 抓取流水线错误分类
///
/// 内外两层重试都依据此分类决定是否继续；任务的最终失败信息
/// 只保留最后一次尝试的错误文本。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    /// 检测到反爬挑战页，内层重试耗尽后抛出
    #[error("blocked after {attempts} attempt(s): {cause}")]
    TransientBlocked { attempts: u32, cause: String },

    /// 导航/下载超时或网络错误
    #[error("transport failure: {0}")]
    Transport(String),

    /// 页面结构完全无法解析
    #[error("extraction failure: {0}")]
    Extraction(String),

    /// 存储层不可用
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// 单张图片下载或上传失败
    #[error("asset failure: {0}")]
    Asset(String),
}

impl ScrapeError {
    /// 是否可在内层（单次会话）重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::TransientBlocked { .. } | ScrapeError::Transport(_)
        )
    }

    /// 用于指标标签的简短类别名
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::TransientBlocked { .. } => "blocked",
            ScrapeError::Transport(_) => "transport",
            ScrapeError::Extraction(_) => "extraction",
            ScrapeError::Persistence(_) => "persistence",
            ScrapeError::Asset(_) => "asset",
        }
    }
}

impl From<RepositoryError> for ScrapeError {
    fn from(err: RepositoryError) -> Self {
        ScrapeError::Persistence(err.to_string())
    }
}

impl From<EngineError> for ScrapeError {
    fn from(err: EngineError) -> Self {
        ScrapeError::Transport(err.to_string())
    }
}
