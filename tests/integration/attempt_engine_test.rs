// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::helpers::{attempt_config, engine, plain_snapshot, FakeBrowser, ScriptedExtractor};
use asinrs::domain::models::product::ItemKey;
use asinrs::engines::attempt_engine::AttemptEngine;
use asinrs::engines::session_limiter::SessionLimiter;
use asinrs::utils::errors::ScrapeError;
use asinrs::utils::retry_policy::RetryPolicy;

/// 并发会话数不超过限额
#[tokio::test(start_paused = true)]
async fn test_open_sessions_never_exceed_capacity() {
    let browser = Arc::new(FakeBrowser::with_navigate_delay(Duration::from_millis(200)));
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let engine = engine(browser.clone(), extractor.clone(), 3, 1);

    let keys: Vec<ItemKey> = (0..20)
        .map(|i| ItemKey::new(format!("B00000{:04}", i), "amazon.com"))
        .collect();
    let results = join_all(keys.iter().map(|key| engine.scrape(key))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(browser.counters.peak.load(Ordering::SeqCst), 3);
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 20);
    assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 20);
    assert_eq!(engine.limiter().in_use(), 0);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 20);
}

/// 每次都被拦截时耗尽内层重试，每个会话都被关闭
#[tokio::test]
async fn test_blocked_every_attempt_exhausts_inner_retry() {
    let browser = Arc::new(FakeBrowser::blocked());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let engine = engine(browser.clone(), extractor.clone(), 2, 3);

    let err = engine
        .scrape(&ItemKey::new("B000000001", "amazon.com"))
        .await
        .unwrap_err();

    match err {
        ScrapeError::TransientBlocked { attempts, cause } => {
            assert_eq!(attempts, 3);
            assert!(cause.contains("validateCaptcha"), "{}", cause);
        }
        other => panic!("expected blocked error, got {:?}", other),
    }
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 3);
    assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 3);
    assert_eq!(browser.counters.open_now.load(Ordering::SeqCst), 0);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

/// 导航失败属于可重试错误，最后一次的原因被保留
#[tokio::test]
async fn test_navigation_failure_is_retried_then_reported() {
    let browser = Arc::new(FakeBrowser {
        fail_navigation: true,
        ..FakeBrowser::new()
    });
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let engine = engine(browser.clone(), extractor, 1, 2);

    let err = engine
        .scrape(&ItemKey::new("B000000001", "amazon.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::Transport(_)));
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 2);
    assert_eq!(browser.counters.closed.load(Ordering::SeqCst), 2);
}

/// 关闭限流器后不再打开新会话
#[tokio::test]
async fn test_closed_limiter_rejects_new_attempts() {
    let browser = Arc::new(FakeBrowser::new());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let engine = engine(browser.clone(), extractor, 1, 1);

    engine.limiter().close();
    let result = engine
        .scrape(&ItemKey::new("B000000001", "amazon.com"))
        .await;

    assert!(result.is_err());
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 0);
}

/// 被拦截后的退避按指数增长并受上限约束
#[tokio::test(start_paused = true)]
async fn test_blocked_retries_back_off_exponentially_with_cap() {
    let browser = Arc::new(FakeBrowser::blocked());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let mut config = attempt_config(4);
    config.block_retry =
        RetryPolicy::exponential(4, Duration::from_secs(2), Duration::from_secs(5));
    let engine = AttemptEngine::new(browser.clone(), extractor, SessionLimiter::new(1), config);

    let started = tokio::time::Instant::now();
    let err = engine
        .scrape(&ItemKey::new("B000000001", "amazon.com"))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        err,
        ScrapeError::TransientBlocked { attempts: 4, .. }
    ));
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 4);

    // 2s + 4s + min(8s, 5s) = 11s，抖动 ±20%
    assert!(elapsed >= Duration::from_millis(8_800), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(13_200), "{:?}", elapsed);
}
