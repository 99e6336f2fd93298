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

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use asinrs::config::settings::Settings;
use asinrs::domain::repositories::product_repository::ProductRepository;
use asinrs::domain::repositories::task_repository::TaskRepository;
use asinrs::domain::services::asset_mirror::AssetMirror;
use asinrs::domain::services::freshness::FreshnessPolicy;
use asinrs::engines::attempt_engine::{AttemptConfig, AttemptEngine};
use asinrs::engines::chromium::ChromiumBrowser;
use asinrs::engines::extractor::HtmlExtractor;
use asinrs::engines::session_limiter::SessionLimiter;
use asinrs::engines::traits::BrowserAutomation;
use asinrs::infrastructure::database::connection;
use asinrs::infrastructure::metrics::init_metrics;
use asinrs::infrastructure::repositories::product_repo_impl::ProductRepositoryImpl;
use asinrs::infrastructure::repositories::task_repo_impl::TaskRepositoryImpl;
use asinrs::infrastructure::storage::create_storage_repository;
use asinrs::presentation::handlers::AppState;
use asinrs::presentation::routes;
use asinrs::queue::task_queue::AdmissionQueue;
use asinrs::utils::telemetry;
use asinrs::workers::manager::WorkerManager;
use asinrs::workers::pipeline::ScrapePipeline;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 等待 ctrl-c
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting asinrs...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new().context("failed to load configuration")?);
    info!("Configuration loaded");

    init_metrics(settings.server.metrics_port);

    // 3. Connect to database and run migrations
    let db = Arc::new(
        connection::connect_and_migrate(&settings.database)
            .await
            .context("failed to prepare database")?,
    );

    // 4. Repositories and storage
    let task_repo = Arc::new(TaskRepositoryImpl::new(db.clone()));
    let product_repo = Arc::new(ProductRepositoryImpl::new(db.clone()));
    let storage = create_storage_repository(&settings.storage)
        .await
        .context("failed to initialise object storage")?;

    // 5. Browser, limiter and attempt engine
    let browser: Arc<dyn BrowserAutomation> = Arc::new(ChromiumBrowser::new(&settings.scraper));
    let limiter = SessionLimiter::new(settings.scraper.global_concurrency);
    let engine = Arc::new(AttemptEngine::new(
        browser.clone(),
        Arc::new(HtmlExtractor::new()),
        limiter.clone(),
        AttemptConfig::from_settings(&settings.scraper),
    ));
    info!(
        engine = browser.name(),
        capacity = settings.scraper.global_concurrency,
        "Attempt engine ready"
    );

    // 6. Pipeline and workers
    let mirror = AssetMirror::new(
        product_repo.clone(),
        storage,
        Duration::from_secs(settings.assets.download_timeout_secs),
        settings.assets.max_concurrent_downloads,
    )?;
    let freshness = FreshnessPolicy::new(settings.scraper.ttl());
    let pipeline = Arc::new(ScrapePipeline::new(
        product_repo.clone(),
        engine,
        mirror,
        freshness,
        settings.worker.task_retry_policy(),
    ));

    let queue = AdmissionQueue::new();
    let mut worker_manager = WorkerManager::new(
        queue.clone(),
        pipeline,
        task_repo.clone(),
        product_repo.clone(),
        browser,
        settings.worker.poll_timeout(),
    );
    worker_manager.start_workers(settings.worker.count);

    // 7. Start HTTP server
    let state = AppState {
        tasks: task_repo as Arc<dyn TaskRepository>,
        products: product_repo as Arc<dyn ProductRepository>,
        queue,
        freshness,
        limiter,
        active_workers: worker_manager.active_counter(),
    };
    let app = routes::routes(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 8. Stop workers and close the browser
    worker_manager.shutdown().await;
    info!("asinrs stopped");

    Ok(())
}
