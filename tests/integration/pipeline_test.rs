// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{
    engine, pipeline, plain_snapshot, snapshot_with_images, FakeBrowser,
    InMemoryProductRepository, ScriptedExtractor,
};
use asinrs::domain::models::asset::AssetStatus;
use asinrs::domain::models::product::{ItemKey, ProductRecord, ProductStatus};
use asinrs::domain::repositories::product_repository::ProductRepository;
use asinrs::domain::services::asset_mirror::AssetMirror;
use asinrs::domain::services::change_detection::structural_digest;
use asinrs::infrastructure::storage::InMemoryStorage;
use asinrs::utils::errors::ScrapeError;
use asinrs::utils::retry_policy::RetryPolicy;
use asinrs::workers::pipeline::PipelineOutcome;

async fn image_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/I/.+"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46]),
        )
        .mount(&server)
        .await;
    server
}

fn stored_name_pattern() -> Regex {
    Regex::new(r"^site\.example/X123/(hero|gallery)_\d+_[0-9a-f]{8}-[0-9a-f]{8}\.jpg$")
        .expect("valid regex")
}

/// 首次抓取：插入记录并镜像全部图片
#[tokio::test]
async fn test_first_scrape_inserts_and_mirrors_assets() {
    let server = image_server().await;
    let key = ItemKey::new("X123", "site.example");

    let products = Arc::new(InMemoryProductRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let extractor = Arc::new(ScriptedExtractor::new(snapshot_with_images(
        &server.uri(),
        19.99,
    )));
    let engine = engine(Arc::new(FakeBrowser::new()), extractor.clone(), 2, 3);
    let pipeline = pipeline(
        products.clone(),
        storage.clone(),
        engine,
        RetryPolicy::linear(1, Duration::ZERO),
    );

    let outcome = pipeline.run(&key, false).await.unwrap();
    let record_id = match outcome {
        PipelineOutcome::Scraped {
            record_id,
            changed,
            assets_stored,
            asset_errors,
        } => {
            assert!(changed);
            assert_eq!(assets_stored, 4);
            assert!(asset_errors.is_empty(), "{:?}", asset_errors);
            record_id
        }
        other => panic!("unexpected outcome: {:?}", other),
    };

    let keys = storage.keys().await;
    assert_eq!(keys.len(), 4);
    let pattern = stored_name_pattern();
    for key in &keys {
        assert!(pattern.is_match(key), "unexpected storage key {}", key);
    }
    assert!(keys.iter().any(|k| k.contains("/hero_0_")));
    assert!(keys.iter().any(|k| k.contains("/gallery_3_")));

    let record = products.find_by_key_now(&key).await.unwrap();
    assert_eq!(record.id, record_id);
    assert_eq!(record.status, ProductStatus::Fresh);
    assert_eq!(record.volatile.price_amount, Some(19.99));

    let derived = products.derived_for(record_id).await;
    assert_eq!(derived.bullets.len(), 2);
    assert!(derived
        .assets
        .iter()
        .all(|a| a.status == AssetStatus::Stored && a.storage_path.is_some()));
}

/// 价格变化不影响摘要：只更新易变字段，不重写从属集合也不上传
#[tokio::test]
async fn test_volatile_change_takes_touch_path() {
    let server = image_server().await;
    let key = ItemKey::new("X123", "site.example");

    let products = Arc::new(InMemoryProductRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let extractor = Arc::new(ScriptedExtractor::new(snapshot_with_images(
        &server.uri(),
        19.99,
    )));
    let engine = engine(Arc::new(FakeBrowser::new()), extractor.clone(), 2, 3);
    let pipeline = pipeline(
        products.clone(),
        storage.clone(),
        engine,
        RetryPolicy::linear(1, Duration::ZERO),
    );

    pipeline.run(&key, false).await.unwrap();
    let rows_after_first = products.derived_rows_written.load(Ordering::SeqCst);
    let bytes_after_first = storage.bytes_written();

    extractor.set(snapshot_with_images(&server.uri(), 17.49));
    let outcome = pipeline.run(&key, true).await.unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Scraped {
            changed: false,
            assets_stored: 0,
            ..
        }
    ));

    assert_eq!(
        products.derived_rows_written.load(Ordering::SeqCst),
        rows_after_first
    );
    assert_eq!(storage.bytes_written(), bytes_after_first);

    let record = products.find_by_key_now(&key).await.unwrap();
    assert_eq!(record.volatile.price_amount, Some(17.49));
}

/// 结构变化时整体替换从属集合
#[tokio::test]
async fn test_structural_change_replaces_derived_rows() {
    let key = ItemKey::new("X123", "site.example");
    let products = Arc::new(InMemoryProductRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let engine = engine(Arc::new(FakeBrowser::new()), extractor.clone(), 1, 1);
    let pipeline = pipeline(
        products.clone(),
        storage,
        engine,
        RetryPolicy::linear(1, Duration::ZERO),
    );

    pipeline.run(&key, false).await.unwrap();
    let first = products.find_by_key_now(&key).await.unwrap();

    let mut renamed = plain_snapshot("Kettle v2");
    renamed.bullets.push("Second bullet with enough text".to_string());
    extractor.set(renamed.clone());

    let outcome = pipeline.run(&key, true).await.unwrap();
    assert!(matches!(
        outcome,
        PipelineOutcome::Scraped { changed: true, .. }
    ));

    let second = products.find_by_key_now(&key).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.title.as_deref(), Some("Kettle v2"));
    assert_eq!(second.structural_digest, structural_digest(&renamed));
    assert_eq!(products.derived_row_count(first.id).await, 2);
}

/// 有效期内的记录不触发浏览器
#[tokio::test]
async fn test_fresh_record_skips_browser() {
    let key = ItemKey::new("X123", "site.example");
    let products = Arc::new(InMemoryProductRepository::new());
    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let browser = Arc::new(FakeBrowser::new());
    let engine = engine(browser.clone(), extractor.clone(), 1, 1);
    let pipeline = pipeline(
        products.clone(),
        Arc::new(InMemoryStorage::new()),
        engine,
        RetryPolicy::linear(1, Duration::ZERO),
    );

    pipeline.run(&key, false).await.unwrap();
    let outcome = pipeline.run(&key, false).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::Fresh { .. }));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(browser.counters.opened.load(Ordering::SeqCst), 1);
}

/// 同一内容重复镜像时第二次不产生上传
#[tokio::test]
async fn test_asset_mirror_is_idempotent() {
    let server = image_server().await;
    let key = ItemKey::new("X123", "site.example");
    let snapshot = snapshot_with_images(&server.uri(), 19.99);
    let digest = structural_digest(&snapshot);

    let products = Arc::new(InMemoryProductRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let record = ProductRecord::from_snapshot(&key, &snapshot, &digest);
    products
        .insert_with_derived(&record, &snapshot.derived_collections())
        .await
        .unwrap();

    let mirror = AssetMirror::new(products.clone(), storage.clone(), Duration::from_secs(5), 2)
        .unwrap();

    let first = mirror.mirror(&key, record.id, &snapshot, &digest).await;
    assert_eq!(first.stored.len(), 4);
    assert!(first.uploaded_bytes() > 0);

    let second = mirror.mirror(&key, record.id, &snapshot, &digest).await;
    assert_eq!(second.stored.len(), 4);
    assert_eq!(second.uploaded_bytes(), 0);
    assert_eq!(storage.keys().await.len(), 4);
    assert_eq!(storage.bytes_written(), first.uploaded_bytes());
}

/// 单张图片下载失败不影响其他图片
#[tokio::test]
async fn test_failed_asset_does_not_block_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/I/hero.*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/I/g.*"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;

    let key = ItemKey::new("X123", "site.example");
    let products = Arc::new(InMemoryProductRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let extractor = Arc::new(ScriptedExtractor::new(snapshot_with_images(
        &server.uri(),
        19.99,
    )));
    let engine = engine(Arc::new(FakeBrowser::new()), extractor, 1, 1);
    let pipeline = pipeline(
        products.clone(),
        storage.clone(),
        engine,
        RetryPolicy::linear(1, Duration::ZERO),
    );

    let outcome = pipeline.run(&key, false).await.unwrap();
    let record_id = match outcome {
        PipelineOutcome::Scraped {
            record_id,
            assets_stored,
            asset_errors,
            ..
        } => {
            assert_eq!(assets_stored, 3);
            assert_eq!(asset_errors.len(), 1);
            record_id
        }
        other => panic!("unexpected outcome: {:?}", other),
    };

    let derived = products.derived_for(record_id).await;
    let hero = derived.assets.iter().find(|a| a.position == 0).unwrap();
    assert_eq!(hero.status, AssetStatus::Failed);
    assert!(hero.storage_path.is_none());
}

/// 存储不可用时整条流水线按线性间隔重跑
#[tokio::test(start_paused = true)]
async fn test_outer_retry_on_persistence_failure() {
    let key = ItemKey::new("X123", "site.example");
    let products = Arc::new(InMemoryProductRepository::new());
    products.fail_writes.store(true, Ordering::SeqCst);

    let extractor = Arc::new(ScriptedExtractor::new(plain_snapshot("Kettle")));
    let engine = engine(Arc::new(FakeBrowser::new()), extractor.clone(), 1, 1);
    let pipeline = pipeline(
        products,
        Arc::new(InMemoryStorage::new()),
        engine,
        RetryPolicy::linear(3, Duration::from_secs(5)),
    );

    let started = tokio::time::Instant::now();
    let err = pipeline.run(&key, false).await.unwrap_err();

    assert!(matches!(err, ScrapeError::Persistence(_)));
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
    // 5s + 10s
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(16), "{:?}", elapsed);
}

/// 结构变化后重新镜像：旧版本对象被清理，每个槽位只留一个对象
#[tokio::test]
async fn test_structural_refresh_remirrors_and_prunes_previous_objects() {
    let server = image_server().await;
    let key = ItemKey::new("X123", "site.example");

    let products = Arc::new(InMemoryProductRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let extractor = Arc::new(ScriptedExtractor::new(snapshot_with_images(
        &server.uri(),
        19.99,
    )));
    let engine = engine(Arc::new(FakeBrowser::new()), extractor.clone(), 2, 3);
    let pipeline = pipeline(
        products.clone(),
        storage.clone(),
        engine,
        RetryPolicy::linear(1, Duration::ZERO),
    );

    pipeline.run(&key, false).await.unwrap();
    let first_keys = storage.keys().await;
    assert_eq!(first_keys.len(), 4);

    let mut renamed = snapshot_with_images(&server.uri(), 19.99);
    renamed.title = Some("Stainless Steel Kettle, 2nd Generation".to_string());
    extractor.set(renamed);

    let outcome = pipeline.run(&key, true).await.unwrap();
    let record_id = match outcome {
        PipelineOutcome::Scraped {
            record_id,
            changed,
            assets_stored,
            ..
        } => {
            assert!(changed);
            assert_eq!(assets_stored, 4);
            record_id
        }
        other => panic!("unexpected outcome: {:?}", other),
    };

    let second_keys = storage.keys().await;
    assert_eq!(second_keys.len(), 4);
    assert!(
        second_keys.iter().all(|k| !first_keys.contains(k)),
        "stale objects left: {:?}",
        second_keys
    );
    let pattern = stored_name_pattern();
    assert!(second_keys.iter().all(|k| pattern.is_match(k)));

    let derived = products.derived_for(record_id).await;
    for asset in &derived.assets {
        let path = asset.storage_path.as_ref().expect("stored path");
        assert!(second_keys.contains(path), "dangling pointer {}", path);
    }
}
