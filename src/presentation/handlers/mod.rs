// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// HTTP请求处理器模块
///
/// 每个处理器负责处理特定类型的HTTP请求并返回响应
pub mod product_handler;
pub mod scrape_handler;
pub mod stats_handler;
pub mod task_handler;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::domain::repositories::product_repository::ProductRepository;
use crate::domain::repositories::task_repository::TaskRepository;
use crate::domain::services::freshness::FreshnessPolicy;
use crate::engines::session_limiter::SessionLimiter;
use crate::queue::task_queue::AdmissionQueue;

/// 处理器共享状态，通过 `Extension` 注入
#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub queue: AdmissionQueue,
    pub freshness: FreshnessPolicy,
    pub limiter: SessionLimiter,
    pub active_workers: Arc<AtomicUsize>,
}
