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

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::utils::retry_policy::RetryPolicy;

/// 应用程序配置设置
///
/// 包含数据库、服务器、抓取引擎、工作器、存储和图片镜像等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 抓取引擎配置
    pub scraper: ScraperSettings,
    /// 工作器配置
    pub worker: WorkerSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 图片镜像配置
    pub assets: AssetSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
    /// Prometheus 导出端口
    pub metrics_port: u16,
}

/// 抓取引擎配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperSettings {
    /// 全局同时打开的浏览器会话上限
    pub global_concurrency: usize,
    /// 记录新鲜度（秒）
    pub ttl_seconds: i64,
    /// 单次尝试内的最大会话次数
    pub inner_attempts: u32,
    /// 导航超时（毫秒）
    pub navigation_timeout_ms: u64,
    /// 被拦截后的退避基数（毫秒）
    pub block_backoff_base_ms: u64,
    /// 被拦截后的退避上限（毫秒）
    pub block_backoff_max_ms: u64,
    /// 导航前随机延迟下限（毫秒）
    pub jitter_min_ms: u64,
    /// 导航前随机延迟上限（毫秒）
    pub jitter_max_ms: u64,
    /// 是否以无头模式启动浏览器
    pub headless: bool,
    /// 连接已有浏览器的调试地址，为空时自行启动
    pub remote_debugging_url: Option<String>,
}

/// 工作器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// 工作器数量
    pub count: usize,
    /// 任务级重试次数
    pub retry_attempts: u32,
    /// 任务级重试基础延迟（秒），第 n 次失败后等待 n 倍
    pub retry_delay_secs: u64,
    /// 队列轮询超时（毫秒）
    pub poll_timeout_ms: u64,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 存储桶名称
    pub s3_bucket: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
}

/// 图片镜像配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSettings {
    /// 单张图片下载超时（秒）
    pub download_timeout_secs: u64,
    /// 单个任务内并发处理的图片数
    pub max_concurrent_downloads: usize,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、配置文件与环境变量依次加载
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("ASINRS").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database.url", "sqlite://asinrs.db?mode=rwc")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.metrics_port", 9000)?
            .set_default("scraper.global_concurrency", 6)?
            .set_default("scraper.ttl_seconds", 86_400)?
            .set_default("scraper.inner_attempts", 3)?
            .set_default("scraper.navigation_timeout_ms", 30_000)?
            .set_default("scraper.block_backoff_base_ms", 2_000)?
            .set_default("scraper.block_backoff_max_ms", 15_000)?
            .set_default("scraper.jitter_min_ms", 300)?
            .set_default("scraper.jitter_max_ms", 1_500)?
            .set_default("scraper.headless", true)?
            .set_default("worker.count", 3)?
            .set_default("worker.retry_attempts", 3)?
            .set_default("worker.retry_delay_secs", 5)?
            .set_default("worker.poll_timeout_ms", 1_000)?
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            .set_default("assets.download_timeout_secs", 30)?
            .set_default("assets.max_concurrent_downloads", 4)
    }

    /// 仅使用内置默认值构造配置
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }
}

impl ScraperSettings {
    /// 会话级（拦截）重试策略
    pub fn block_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.inner_attempts,
            Duration::from_millis(self.block_backoff_base_ms),
            Duration::from_millis(self.block_backoff_max_ms),
        )
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds)
    }
}

impl WorkerSettings {
    /// 任务级重试策略：线性退避
    pub fn task_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.retry_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
