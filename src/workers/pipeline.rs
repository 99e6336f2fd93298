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

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::product::ItemKey;
use crate::domain::repositories::product_repository::ProductRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::asset_mirror::AssetMirror;
use crate::domain::services::change_detection::ChangeDetectionGate;
use crate::domain::services::freshness::FreshnessPolicy;
use crate::engines::attempt_engine::AttemptEngine;
use crate::utils::errors::ScrapeError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::key_lock::KeyLocks;

/// 一次流水线运行的结果
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// 记录仍在有效期内，未抓取
    Fresh { record_id: Uuid },
    /// 完成抓取与持久化
    Scraped {
        record_id: Uuid,
        changed: bool,
        assets_stored: usize,
        asset_errors: Vec<String>,
    },
}

/// 抓取流水线：新鲜度判断 → 尝试引擎 → 变更检测 → 图片镜像
///
/// 外层重试以线性增长的间隔重跑整条流水线，只保留最后一次的错误。
pub struct ScrapePipeline<P, S>
where
    P: ProductRepository + ?Sized,
    S: StorageRepository + ?Sized,
{
    products: Arc<P>,
    engine: Arc<AttemptEngine>,
    gate: ChangeDetectionGate<P>,
    mirror: AssetMirror<P, S>,
    freshness: FreshnessPolicy,
    retry: RetryPolicy,
    key_locks: KeyLocks,
}

impl<P, S> ScrapePipeline<P, S>
where
    P: ProductRepository + ?Sized,
    S: StorageRepository + ?Sized,
{
    pub fn new(
        products: Arc<P>,
        engine: Arc<AttemptEngine>,
        mirror: AssetMirror<P, S>,
        freshness: FreshnessPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gate: ChangeDetectionGate::new(products.clone()),
            products,
            engine,
            mirror,
            freshness,
            retry,
            key_locks: KeyLocks::new(),
        }
    }

    pub fn engine(&self) -> &AttemptEngine {
        &self.engine
    }

    pub fn freshness(&self) -> &FreshnessPolicy {
        &self.freshness
    }

    /// 运行流水线，失败时按外层策略重试
    ///
    /// # 参数
    ///
    /// * `key` - 抓取目标
    /// * `force` - 忽略新鲜度直接抓取
    pub async fn run(&self, key: &ItemKey, force: bool) -> Result<PipelineOutcome, ScrapeError> {
        let _guard = self.key_locks.lock(key).await;

        let existing = self.products.find_by_key(key).await?;
        if !self.freshness.needs_fetch(existing.as_ref(), force) {
            if let Some(record) = existing {
                debug!(product = %key, "Record still fresh, skipping scrape");
                return Ok(PipelineOutcome::Fresh {
                    record_id: record.id,
                });
            }
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.run_once(key).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!(
                        product = %key,
                        attempt,
                        max_attempts,
                        kind = e.kind(),
                        "Pipeline attempt failed: {}",
                        e
                    );
                    if !self.retry.should_retry(attempt) {
                        return Err(e);
                    }
                    let delay = self.retry.calculate_backoff(attempt);
                    debug!(product = %key, delay_ms = delay.as_millis() as u64, "Backing off before next pipeline attempt");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_once(&self, key: &ItemKey) -> Result<PipelineOutcome, ScrapeError> {
        let snapshot = self.engine.scrape(key).await?;
        let outcome = self.gate.persist(key, &snapshot).await?;

        if !outcome.changed {
            return Ok(PipelineOutcome::Scraped {
                record_id: outcome.record_id,
                changed: false,
                assets_stored: 0,
                asset_errors: Vec::new(),
            });
        }

        let report = self
            .mirror
            .mirror(key, outcome.record_id, &snapshot, &outcome.digest)
            .await;
        info!(
            product = %key,
            stored = report.stored.len(),
            errors = report.errors.len(),
            uploaded_bytes = report.uploaded_bytes(),
            "Assets mirrored"
        );

        Ok(PipelineOutcome::Scraped {
            record_id: outcome.record_id,
            changed: true,
            assets_stored: report.stored.len(),
            asset_errors: report.errors,
        })
    }
}
