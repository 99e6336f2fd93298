// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 对象已存在（条件写冲突）
    #[error("Object already exists: {0}")]
    AlreadyExists(String),
    /// 存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 对象存储特质
///
/// 定义图片镜像所需的最小对象存储接口
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 写入对象
    ///
    /// 目标已存在时返回 `StorageError::AlreadyExists`，调用方应视为成功。
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    /// 列出以 `prefix` 开头的完整对象键
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// 批量删除对象，不存在的键被忽略
    async fn delete(&self, keys: &[String]) -> Result<(), StorageError>;
}
