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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::product::ProductStatus;
use crate::domain::models::task::TaskStatus;
use crate::domain::repositories::product_repository::ProductRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::repositories::task_repository::TaskRepository;
use crate::queue::task_queue::{AdmissionQueue, QueueError, QueuedScrape};
use crate::workers::pipeline::{PipelineOutcome, ScrapePipeline};

/// 抓取工作者
///
/// 循环从准入队列取请求，驱动流水线并回写任务状态。停机信号到达时，
/// 正在处理的请求被取消，打开的会话由会话守卫关闭。
pub struct ScrapeWorker<P, S, T>
where
    P: ProductRepository + ?Sized,
    S: StorageRepository + ?Sized,
    T: TaskRepository + ?Sized,
{
    worker_id: Uuid,
    queue: AdmissionQueue,
    pipeline: Arc<ScrapePipeline<P, S>>,
    tasks: Arc<T>,
    products: Arc<P>,
    poll_timeout: Duration,
    active: Arc<AtomicUsize>,
}

/// 处理中计数，离开作用域时归还
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("workers_active").set(now as f64);
        Self(active.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("workers_active").set(now as f64);
    }
}

impl<P, S, T> ScrapeWorker<P, S, T>
where
    P: ProductRepository + ?Sized,
    S: StorageRepository + ?Sized,
    T: TaskRepository + ?Sized,
{
    pub fn new(
        queue: AdmissionQueue,
        pipeline: Arc<ScrapePipeline<P, S>>,
        tasks: Arc<T>,
        products: Arc<P>,
        poll_timeout: Duration,
        active: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            worker_id: Uuid::new_v4(),
            queue,
            pipeline,
            tasks,
            products,
            poll_timeout,
            active,
        }
    }

    /// 运行工作循环，直到收到停机信号或队列关闭
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scrape worker {} started", self.worker_id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let item = tokio::select! {
                _ = shutdown.changed() => break,
                dequeued = self.queue.dequeue(self.poll_timeout) => match dequeued {
                    Ok(Some(item)) => item,
                    Ok(None) => continue,
                    Err(QueueError::Closed) => {
                        debug!("Admission queue closed");
                        break;
                    }
                },
            };

            let key = item.key.clone();
            tokio::select! {
                _ = shutdown.changed() => {
                    warn!(product = %key, "Shutdown during processing, task abandoned");
                    break;
                }
                _ = self.process(item) => {}
            }
        }

        info!("Scrape worker {} stopped", self.worker_id);
    }

    #[instrument(
        skip(self, item),
        fields(
            task_id = ?item.task_id,
            asin = %item.key.asin,
            marketplace = %item.key.marketplace
        )
    )]
    async fn process(&self, item: QueuedScrape) {
        let _active = ActiveGuard::enter(&self.active);

        if let Some(task_id) = item.task_id {
            if let Err(e) = self
                .tasks
                .update_status(task_id, TaskStatus::Running, None)
                .await
            {
                warn!("Failed to mark task running, skipping: {}", e);
                return;
            }
        }

        match self.pipeline.run(&item.key, item.force).await {
            Ok(outcome) => {
                counter!("scrape_tasks_completed_total").increment(1);
                match &outcome {
                    PipelineOutcome::Fresh { record_id } => {
                        info!(%record_id, "Record fresh, nothing to do")
                    }
                    PipelineOutcome::Scraped {
                        record_id,
                        changed,
                        assets_stored,
                        asset_errors,
                    } => info!(
                        %record_id,
                        changed,
                        assets_stored,
                        asset_errors = asset_errors.len(),
                        "Task completed"
                    ),
                }
                self.finish(item.task_id, TaskStatus::Success, None).await;
            }
            Err(e) => {
                counter!("scrape_tasks_failed_total", "kind" => e.kind()).increment(1);
                error!("Task failed: {}", e);
                if let Err(db_err) = self
                    .products
                    .set_status(&item.key, ProductStatus::Failed)
                    .await
                {
                    debug!("Failed to mark product failed: {}", db_err);
                }
                self.finish(item.task_id, TaskStatus::Failed, Some(e.to_string()))
                    .await;
            }
        }
    }

    async fn finish(&self, task_id: Option<Uuid>, status: TaskStatus, error: Option<String>) {
        let Some(task_id) = task_id else {
            return;
        };
        if let Err(e) = self.tasks.update_status(task_id, status, error).await {
            error!(%task_id, "Failed to record task status {}: {}", status, e);
        }
    }
}
