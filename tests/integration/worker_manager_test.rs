// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::helpers::{
    engine, pipeline, plain_snapshot, FakeBrowser, InMemoryProductRepository,
    InMemoryTaskRepository, ScriptedExtractor,
};
use asinrs::domain::models::product::{ItemKey, ProductStatus};
use asinrs::domain::models::task::{ScrapeTask, TaskStatus};
use asinrs::domain::repositories::task_repository::TaskRepository;
use asinrs::engines::traits::BrowserAutomation;
use asinrs::infrastructure::storage::InMemoryStorage;
use asinrs::queue::task_queue::{AdmissionQueue, QueuedScrape};
use asinrs::utils::retry_policy::RetryPolicy;
use asinrs::workers::manager::WorkerManager;

async fn wait_for_terminal(tasks: &InMemoryTaskRepository, id: uuid::Uuid) -> ScrapeTask {
    for _ in 0..100 {
        let task = tasks.find_by_id(id).await.unwrap().unwrap();
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} did not finish", id);
}

#[tokio::test]
async fn test_workers_complete_queued_tasks_and_shutdown() {
    let products = Arc::new(InMemoryProductRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let browser = Arc::new(FakeBrowser::new());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let pipeline = Arc::new(pipeline(
        products.clone(),
        Arc::new(InMemoryStorage::new()),
        engine(browser.clone(), extractor, 2, 1),
        RetryPolicy::linear(1, Duration::ZERO),
    ));

    let queue = AdmissionQueue::new();
    let mut manager = WorkerManager::new(
        queue.clone(),
        pipeline,
        tasks.clone(),
        products.clone(),
        browser.clone() as Arc<dyn BrowserAutomation>,
        Duration::from_millis(50),
    );
    manager.start_workers(2);

    let mut ids = Vec::new();
    for i in 0..3 {
        let key = ItemKey::new(format!("B00000000{}", i), "amazon.com");
        let task = tasks.create(&ScrapeTask::new(&key, None)).await.unwrap();
        queue.enqueue(QueuedScrape::new(key, Some(task.id))).unwrap();
        ids.push(task.id);
    }

    for id in ids {
        let task = wait_for_terminal(&tasks, id).await;
        assert_eq!(task.status, TaskStatus::Success);
        assert!(task.error.is_none());
    }

    let record = products
        .find_by_key_now(&ItemKey::new("B000000001", "amazon.com"))
        .await
        .unwrap();
    assert_eq!(record.status, ProductStatus::Fresh);

    manager.shutdown().await;
    assert!(browser.shut_down.load(Ordering::SeqCst));
    assert_eq!(manager.active_workers(), 0);
    assert!(queue
        .enqueue(QueuedScrape::new(ItemKey::new("B000000009", "amazon.com"), None))
        .is_err());
}

#[tokio::test]
async fn test_failed_pipeline_marks_task_failed_with_last_error() {
    let products = Arc::new(InMemoryProductRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let browser = Arc::new(FakeBrowser::blocked());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let pipeline = Arc::new(pipeline(
        products.clone(),
        Arc::new(InMemoryStorage::new()),
        engine(browser.clone(), extractor, 1, 2),
        RetryPolicy::linear(1, Duration::ZERO),
    ));

    let queue = AdmissionQueue::new();
    let mut manager = WorkerManager::new(
        queue.clone(),
        pipeline,
        tasks.clone(),
        products,
        browser.clone() as Arc<dyn BrowserAutomation>,
        Duration::from_millis(50),
    );
    manager.start_workers(1);

    let key = ItemKey::new("B000000001", "amazon.com");
    let task = tasks.create(&ScrapeTask::new(&key, None)).await.unwrap();
    queue.enqueue(QueuedScrape::new(key, Some(task.id))).unwrap();

    let task = wait_for_terminal(&tasks, task.id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error.unwrap();
    assert!(error.contains("blocked after 2 attempt(s)"), "{}", error);
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_session_held_by_running_task() {
    let products = Arc::new(InMemoryProductRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let browser = Arc::new(FakeBrowser::with_navigate_delay(Duration::from_secs(60)));
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let pipeline = Arc::new(pipeline(
        products.clone(),
        Arc::new(InMemoryStorage::new()),
        engine(browser.clone(), extractor.clone(), 1, 1),
        RetryPolicy::linear(1, Duration::ZERO),
    ));

    let queue = AdmissionQueue::new();
    let mut manager = WorkerManager::new(
        queue.clone(),
        pipeline,
        tasks.clone(),
        products,
        browser.clone() as Arc<dyn BrowserAutomation>,
        Duration::from_millis(50),
    );
    manager.start_workers(1);

    let key = ItemKey::new("B000000001", "amazon.com");
    let task = tasks.create(&ScrapeTask::new(&key, None)).await.unwrap();
    queue.enqueue(QueuedScrape::new(key, Some(task.id))).unwrap();

    for _ in 0..100 {
        if browser.counters.open_now.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(browser.counters.open_now.load(Ordering::SeqCst), 1);

    manager.shutdown().await;

    for _ in 0..50 {
        if browser.counters.open_now.load(Ordering::SeqCst) == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(browser.counters.open_now.load(Ordering::SeqCst), 0);
    assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 1);
    assert!(browser.shut_down.load(Ordering::SeqCst));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);

    let task = tasks.find_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
}
