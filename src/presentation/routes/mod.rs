// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::presentation::handlers::{
    product_handler, scrape_handler, stats_handler, task_handler, AppState,
};

/// 创建应用路由
///
/// # 参数
///
/// * `state` - 处理器共享状态
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version))
        .route("/v1/scrape", post(scrape_handler::create_scrape))
        .route("/v1/tasks/{id}", get(task_handler::get_task))
        .route("/v1/products/{asin}", get(product_handler::get_product))
        .route("/v1/stats", get(stats_handler::get_stats))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
