// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DbErr;
use tokio::sync::Mutex;
use uuid::Uuid;

use asinrs::domain::models::asset::{AssetRole, AssetStatus};
use asinrs::domain::models::product::{
    DerivedCollections, ImageRef, ItemKey, Price, ProductRecord, ProductSnapshot, ProductStatus,
    VolatileFields,
};
use asinrs::domain::models::task::{ScrapeTask, TaskStatus};
use asinrs::domain::repositories::product_repository::{ProductRepository, ProductStats};
use asinrs::domain::repositories::task_repository::{RepositoryError, TaskRepository, TaskStats};
use asinrs::domain::services::asset_mirror::AssetMirror;
use asinrs::domain::services::freshness::FreshnessPolicy;
use asinrs::engines::attempt_engine::{AttemptConfig, AttemptEngine};
use asinrs::engines::fingerprint::Fingerprint;
use asinrs::engines::session_limiter::SessionLimiter;
use asinrs::engines::traits::{BrowserAutomation, BrowserSession, ContentExtractor, EngineError};
use asinrs::infrastructure::storage::InMemoryStorage;
use asinrs::utils::errors::ScrapeError;
use asinrs::utils::retry_policy::RetryPolicy;
use asinrs::workers::pipeline::ScrapePipeline;

/// 内存商品仓库，记录派生集合写入次数
#[derive(Default)]
pub struct InMemoryProductRepository {
    records: Mutex<HashMap<ItemKey, ProductRecord>>,
    derived: Mutex<HashMap<Uuid, DerivedCollections>>,
    pub derived_rows_written: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(DbErr::Custom(
                "store unavailable".to_string(),
            )));
        }
        Ok(())
    }

    pub async fn derived_row_count(&self, id: Uuid) -> usize {
        self.derived
            .lock()
            .await
            .get(&id)
            .map(DerivedCollections::row_count)
            .unwrap_or(0)
    }

    pub async fn find_by_key_now(&self, key: &ItemKey) -> Option<ProductRecord> {
        self.records.lock().await.get(key).cloned()
    }

    pub async fn derived_for(&self, id: Uuid) -> DerivedCollections {
        self.derived
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn insert_record(&self, record: ProductRecord) {
        self.records.lock().await.insert(record.key(), record);
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_key(&self, key: &ItemKey) -> Result<Option<ProductRecord>, RepositoryError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn insert_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<Uuid, RepositoryError> {
        self.check_writable()?;
        let mut records = self.records.lock().await;
        if records.contains_key(&record.key()) {
            return Err(RepositoryError::Database(DbErr::Custom(
                "duplicate key".to_string(),
            )));
        }
        records.insert(record.key(), record.clone());
        self.derived.lock().await.insert(record.id, derived.clone());
        self.derived_rows_written
            .fetch_add(derived.row_count(), Ordering::SeqCst);
        Ok(record.id)
    }

    async fn replace_with_derived(
        &self,
        record: &ProductRecord,
        derived: &DerivedCollections,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut records = self.records.lock().await;
        if !records.contains_key(&record.key()) {
            return Err(RepositoryError::NotFound);
        }
        records.insert(record.key(), record.clone());
        self.derived.lock().await.insert(record.id, derived.clone());
        self.derived_rows_written
            .fetch_add(derived.row_count(), Ordering::SeqCst);
        Ok(())
    }

    async fn touch_volatile(
        &self,
        id: Uuid,
        volatile: &VolatileFields,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let mut records = self.records.lock().await;
        let record = records
            .values_mut()
            .find(|r| r.id == id)
            .ok_or(RepositoryError::NotFound)?;
        record.volatile = volatile.clone();
        record.status = ProductStatus::Fresh;
        record.last_scraped_at = Some(Utc::now());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find_derived(&self, id: Uuid) -> Result<DerivedCollections, RepositoryError> {
        Ok(self
            .derived
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_asset_stored(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
        storage_path: &str,
    ) -> Result<(), RepositoryError> {
        let mut derived = self.derived.lock().await;
        let asset = derived
            .get_mut(&id)
            .and_then(|d| {
                d.assets
                    .iter_mut()
                    .find(|a| a.role == role && a.position == position)
            })
            .ok_or(RepositoryError::NotFound)?;
        asset.storage_path = Some(storage_path.to_string());
        asset.status = AssetStatus::Stored;
        Ok(())
    }

    async fn set_asset_failed(
        &self,
        id: Uuid,
        role: AssetRole,
        position: i32,
    ) -> Result<(), RepositoryError> {
        let mut derived = self.derived.lock().await;
        if let Some(asset) = derived.get_mut(&id).and_then(|d| {
            d.assets
                .iter_mut()
                .find(|a| a.role == role && a.position == position)
        }) {
            asset.status = AssetStatus::Failed;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        key: &ItemKey,
        status: ProductStatus,
    ) -> Result<(), RepositoryError> {
        if let Some(record) = self.records.lock().await.get_mut(key) {
            record.status = status;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<ProductStats, RepositoryError> {
        let records = self.records.lock().await;
        let count = |s: ProductStatus| records.values().filter(|r| r.status == s).count() as u64;
        let assets_stored = self
            .derived
            .lock()
            .await
            .values()
            .flat_map(|d| d.assets.iter())
            .filter(|a| a.status == AssetStatus::Stored)
            .count() as u64;
        Ok(ProductStats {
            total: records.len() as u64,
            fresh: count(ProductStatus::Fresh),
            stale: count(ProductStatus::Stale),
            failed: count(ProductStatus::Failed),
            pending: count(ProductStatus::Pending),
            assets_stored,
        })
    }
}

/// 内存任务仓库
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<Uuid, ScrapeTask>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &ScrapeTask) -> Result<ScrapeTask, RepositoryError> {
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeTask>, RepositoryError> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        error: Option<String>,
    ) -> Result<ScrapeTask, RepositoryError> {
        let mut tasks = self.tasks.lock().await;
        let current = tasks.get(&id).cloned().ok_or(RepositoryError::NotFound)?;
        let updated = current.transition(status, error)?;
        tasks.insert(id, updated.clone());
        Ok(updated)
    }

    async fn stats(&self) -> Result<TaskStats, RepositoryError> {
        let tasks = self.tasks.lock().await;
        let count = |s: TaskStatus| tasks.values().filter(|t| t.status == s).count() as u64;
        Ok(TaskStats {
            queued: count(TaskStatus::Queued),
            running: count(TaskStatus::Running),
            success: count(TaskStatus::Success),
            failed: count(TaskStatus::Failed),
        })
    }
}

/// 浏览器会话计数
#[derive(Default)]
pub struct SessionCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub open_now: AtomicUsize,
    pub peak: AtomicUsize,
}

/// 假浏览器：按配置返回正常页或挑战页
pub struct FakeBrowser {
    pub counters: Arc<SessionCounters>,
    pub blocked: bool,
    pub navigate_delay: Duration,
    pub fail_navigation: bool,
    pub shut_down: AtomicBool,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(SessionCounters::default()),
            blocked: false,
            navigate_delay: Duration::ZERO,
            fail_navigation: false,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn blocked() -> Self {
        Self {
            blocked: true,
            ..Self::new()
        }
    }

    pub fn with_navigate_delay(delay: Duration) -> Self {
        Self {
            navigate_delay: delay,
            ..Self::new()
        }
    }
}

struct FakeSession {
    counters: Arc<SessionCounters>,
    blocked: bool,
    navigate_delay: Duration,
    fail_navigation: bool,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, _url: &str, timeout: Duration) -> Result<(), EngineError> {
        if self.fail_navigation {
            return Err(EngineError::Timeout(timeout));
        }
        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }
        Ok(())
    }

    async fn query_selector(&self, selector: &str) -> Result<bool, EngineError> {
        Ok(self.blocked && selector.contains("validateCaptcha"))
    }

    async fn title(&self) -> Result<Option<String>, EngineError> {
        Ok(Some(if self.blocked {
            "Robot Check".to_string()
        } else {
            "Amazon.com: Test Product".to_string()
        }))
    }

    async fn content(&self) -> Result<String, EngineError> {
        Ok("<html><body><span id=\"productTitle\">Test</span></body></html>".to_string())
    }

    async fn scroll_to(&self, _y: u32) -> Result<(), EngineError> {
        Ok(())
    }

    async fn move_pointer(&self, _x: f64, _y: f64) -> Result<(), EngineError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserAutomation for FakeBrowser {
    async fn open_session(
        &self,
        _fingerprint: &Fingerprint,
    ) -> Result<Box<dyn BrowserSession>, EngineError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: self.counters.clone(),
            blocked: self.blocked,
            navigate_delay: self.navigate_delay,
            fail_navigation: self.fail_navigation,
            closed: AtomicBool::new(false),
        }))
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// 返回预设快照的提取器，快照可在两次抓取之间替换
pub struct ScriptedExtractor {
    snapshot: std::sync::Mutex<ProductSnapshot>,
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(snapshot: ProductSnapshot) -> Self {
        Self {
            snapshot: std::sync::Mutex::new(snapshot),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, snapshot: ProductSnapshot) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = snapshot;
        }
    }
}

#[async_trait]
impl ContentExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _session: &dyn BrowserSession,
        _key: &ItemKey,
    ) -> Result<ProductSnapshot, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .map_err(|e| ScrapeError::Extraction(e.to_string()))
    }
}

/// 无抖动、无退避的尝试配置
pub fn attempt_config(inner_attempts: u32) -> AttemptConfig {
    AttemptConfig {
        navigation_timeout: Duration::from_secs(5),
        block_retry: RetryPolicy::exponential(inner_attempts, Duration::ZERO, Duration::ZERO),
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
    }
}

pub fn engine(
    browser: Arc<dyn BrowserAutomation>,
    extractor: Arc<dyn ContentExtractor>,
    capacity: usize,
    inner_attempts: u32,
) -> Arc<AttemptEngine> {
    Arc::new(AttemptEngine::new(
        browser,
        extractor,
        SessionLimiter::new(capacity),
        attempt_config(inner_attempts),
    ))
}

pub type TestPipeline = ScrapePipeline<InMemoryProductRepository, InMemoryStorage>;

pub fn pipeline(
    products: Arc<InMemoryProductRepository>,
    storage: Arc<InMemoryStorage>,
    engine: Arc<AttemptEngine>,
    outer: RetryPolicy,
) -> TestPipeline {
    let mirror = AssetMirror::new(products.clone(), storage, Duration::from_secs(5), 4)
        .expect("mirror client");
    ScrapePipeline::new(
        products,
        engine,
        mirror,
        FreshnessPolicy::new(chrono::Duration::hours(24)),
        outer,
    )
}

/// 带图片的快照，图片地址指向 `base_url`
pub fn snapshot_with_images(base_url: &str, price: f64) -> ProductSnapshot {
    ProductSnapshot {
        title: Some("Stainless Steel Kettle".to_string()),
        rating: Some(4.5),
        ratings_count: Some(120),
        price: Some(Price {
            amount: price,
            currency: "USD".to_string(),
        }),
        availability: Some("In Stock".to_string()),
        hero_image: Some(ImageRef::new(
            format!("{}/images/I/hero._SX300_.jpg", base_url),
            0,
        )),
        gallery: (1..=3)
            .map(|i| ImageRef::new(format!("{}/images/I/g{}._SS40_.jpg", base_url, i), i))
            .collect(),
        bullets: vec![
            "Boils 1.7 litres in under three minutes".to_string(),
            "Auto shut-off and boil-dry protection".to_string(),
        ],
        ..Default::default()
    }
}

/// 不含图片的快照
pub fn plain_snapshot(title: &str) -> ProductSnapshot {
    ProductSnapshot {
        title: Some(title.to_string()),
        bullets: vec!["A bullet that is long enough".to_string()],
        ..Default::default()
    }
}
