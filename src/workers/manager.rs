// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::repositories::product_repository::ProductRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::repositories::task_repository::TaskRepository;
use crate::engines::traits::BrowserAutomation;
use crate::queue::task_queue::AdmissionQueue;
use crate::workers::pipeline::ScrapePipeline;
use crate::workers::scrape_worker::ScrapeWorker;

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 工作管理器
pub struct WorkerManager<P, S, T>
where
    P: ProductRepository + ?Sized + 'static,
    S: StorageRepository + ?Sized + 'static,
    T: TaskRepository + ?Sized + 'static,
{
    queue: AdmissionQueue,
    pipeline: Arc<ScrapePipeline<P, S>>,
    tasks: Arc<T>,
    products: Arc<P>,
    browser: Arc<dyn BrowserAutomation>,
    poll_timeout: Duration,
    active: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl<P, S, T> WorkerManager<P, S, T>
where
    P: ProductRepository + ?Sized + 'static,
    S: StorageRepository + ?Sized + 'static,
    T: TaskRepository + ?Sized + 'static,
{
    pub fn new(
        queue: AdmissionQueue,
        pipeline: Arc<ScrapePipeline<P, S>>,
        tasks: Arc<T>,
        products: Arc<P>,
        browser: Arc<dyn BrowserAutomation>,
        poll_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            pipeline,
            tasks,
            products,
            browser,
            poll_timeout,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// 启动工作进程
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    pub fn start_workers(&mut self, count: usize) {
        for _ in 0..count {
            let worker = ScrapeWorker::new(
                self.queue.clone(),
                self.pipeline.clone(),
                self.tasks.clone(),
                self.products.clone(),
                self.poll_timeout,
                self.active.clone(),
            );
            let shutdown = self.shutdown_tx.subscribe();
            self.handles.push(tokio::spawn(async move {
                worker.run(shutdown).await;
            }));
        }
        info!("Started {} scrape workers", count);
    }

    /// 正在处理请求的工作者数量
    pub fn active_counter(&self) -> Arc<AtomicUsize> {
        self.active.clone()
    }

    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 优雅停机
    ///
    /// 通知所有工作者退出并等待其结束，随后关闭共享浏览器。
    /// 未出队的请求被丢弃。
    pub async fn shutdown(&mut self) {
        info!("Shutting down workers...");
        let _ = self.shutdown_tx.send(true);
        self.queue.close().await;

        for handle in self.handles.drain(..) {
            match tokio::time::timeout(WORKER_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Worker task panicked: {}", e),
                Err(_) => warn!("Worker did not stop within {:?}", WORKER_JOIN_TIMEOUT),
            }
        }

        self.pipeline.engine().limiter().close();
        if let Err(e) = self.browser.shutdown().await {
            warn!("Browser shutdown failed: {}", e);
        }

        if !self.queue.is_empty() {
            warn!("Dropped {} queued requests on shutdown", self.queue.len());
        }
        info!("Workers shut down successfully");
    }
}
