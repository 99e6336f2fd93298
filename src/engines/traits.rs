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

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::product::{ItemKey, ProductSnapshot};
use crate::engines::fingerprint::Fingerprint;
use crate::utils::errors::ScrapeError;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 浏览器启动或连接失败
    #[error("Browser launch failed: {0}")]
    Launch(String),
    /// 导航失败
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// 超时
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    /// CDP 命令失败
    #[error("CDP error: {0}")]
    Cdp(String),
    /// 浏览器已关闭
    #[error("Browser has been shut down")]
    Shutdown,
}

/// 隔离的浏览器会话
///
/// 每次尝试独占一个会话，不同尝试之间不共享 cookie 与存储。
/// 调用方必须在所有退出路径上调用 `close`。
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 导航并等待 DOM 就绪（不等待网络空闲）
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), EngineError>;

    /// 选择器是否命中任意元素
    async fn query_selector(&self, selector: &str) -> Result<bool, EngineError>;

    async fn title(&self) -> Result<Option<String>, EngineError>;

    /// 当前页面 HTML
    async fn content(&self) -> Result<String, EngineError>;

    async fn scroll_to(&self, y: u32) -> Result<(), EngineError>;

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), EngineError>;

    /// 关闭会话并释放浏览器上下文，可重复调用
    async fn close(&self) -> Result<(), EngineError>;
}

/// 浏览器自动化能力
///
/// 共享的浏览器句柄，以显式依赖的方式注入每次尝试。
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// 以给定指纹打开一个新的隔离会话
    async fn open_session(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Box<dyn BrowserSession>, EngineError>;

    /// 关闭底层浏览器
    async fn shutdown(&self) -> Result<(), EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

/// 内容提取器
///
/// 单个字段解析失败降级为缺失值，只有整体失败才返回错误。
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(
        &self,
        session: &dyn BrowserSession,
        key: &ItemKey,
    ) -> Result<ProductSnapshot, ScrapeError>;
}
