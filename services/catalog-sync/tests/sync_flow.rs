mod common;

use std::sync::Arc;
use std::time::Duration;

use catalog_sync::application::{
    SyncScheduler, WarmupService, WarmupSettings, WarmupStop,
};
use catalog_sync::domain::enums::MappingStatus;
use catalog_sync::domain::gateways::DownstreamError;
use catalog_sync::domain::repositories::MappingRepository;
use catalog_sync::domain::value_objects::{DownstreamId, SourceProductId};
use common::{FakeDownstream, FakeSource, Harness, product};
use tokio_util::sync::CancellationToken;

fn soap(name: &str) -> catalog_sync::domain::entities::SourceProduct {
    product("kat-77", "9340003", name).with_barcode(Some("8690000000017".to_string()))
}

#[tokio::test]
async fn test_changed_product_gets_new_versioned_card() {
    let harness = Harness::new(FakeDownstream::new());
    let source = Arc::new(FakeSource::new(vec![soap("Zeytinyağlı Sabun")]));
    let handler = harness.handler(source.clone(), 2);
    let cancel = CancellationToken::new();

    let first = handler.sync_changed_products(None, &cancel).await.unwrap();
    assert_eq!(first.total_count, 1);
    assert_eq!(first.success_count, 1);

    source.replace(vec![soap("Zeytinyağlı Sabun 500g")]);
    let second = handler.sync_changed_products(None, &cancel).await.unwrap();
    assert_eq!(second.success_count, 1);

    let payloads = harness.downstream.created_payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0].kart_kodu, "9340003");
    assert_eq!(payloads[0].barkod.as_deref(), Some("8690000000017"));
    assert_eq!(payloads[1].kart_kodu, "9340003-V2");
    assert_eq!(payloads[1].barkod, None);

    let source_id = SourceProductId::new("kat-77");
    let history = harness.repository.history(&source_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status(), MappingStatus::Superseded);
    assert_eq!(history[1].status(), MappingStatus::Synced);
    assert_eq!(history.iter().filter(|m| m.is_active()).count(), 1);

    let active = harness.repository.find_active(&source_id).await.unwrap().unwrap();
    assert_eq!(active.version(), 2);
    assert_eq!(active.canonical_versioned_code().as_str(), "9340003-V2");
}

#[tokio::test]
async fn test_unchanged_product_is_skipped() {
    let harness = Harness::new(FakeDownstream::new());
    let source = Arc::new(FakeSource::new(vec![soap("Sabun")]));
    let handler = harness.handler(source, 2);
    let cancel = CancellationToken::new();

    handler.sync_changed_products(None, &cancel).await.unwrap();
    let again = handler.sync_changed_products(None, &cancel).await.unwrap();

    assert_eq!(again.total_count, 1);
    assert_eq!(again.skipped_count, 1);
    assert_eq!(again.success_count, 0);
    assert_eq!(harness.downstream.create_count(), 1);
}

#[tokio::test]
async fn test_failed_mapping_is_retried_with_same_version() {
    let harness = Harness::new(FakeDownstream::new());
    harness
        .downstream
        .fail_creates([DownstreamError::Validation("Kategori bulunamadı".to_string())]);
    let source = Arc::new(FakeSource::new(vec![soap("Sabun")]));
    let handler = harness.handler(source, 1);
    let cancel = CancellationToken::new();

    let first = handler.sync_changed_products(None, &cancel).await.unwrap();
    assert_eq!(first.failed_count, 1);

    let retried = handler.retry_failed(&cancel).await.unwrap();
    assert_eq!(retried.success_count, 1);

    let source_id = SourceProductId::new("kat-77");
    let active = harness.repository.find_active(&source_id).await.unwrap().unwrap();
    assert_eq!(active.version(), 1);
    assert_eq!(active.status(), MappingStatus::Synced);
    assert_eq!(active.attempt_count(), 2);
    assert_eq!(harness.repository.history(&source_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelled_sync_is_rejected_up_front() {
    let harness = Harness::new(FakeDownstream::new());
    let source = Arc::new(FakeSource::new(vec![soap("Sabun")]));
    let handler = harness.handler(source.clone(), 1);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = handler.sync_changed_products(None, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(source.calls.lock().is_empty());
}

#[tokio::test]
async fn test_scheduler_advances_since_after_clean_cycle() {
    let harness = Harness::new(FakeDownstream::new());
    let source = Arc::new(FakeSource::new(vec![soap("Sabun")]));
    let scheduler = SyncScheduler::new(
        Arc::new(harness.handler(source.clone(), 1)),
        Duration::from_secs(300),
    );
    let cancel = CancellationToken::new();

    assert!(scheduler.since().is_none());
    let summary = scheduler.run_cycle(&cancel).await.unwrap();
    assert_eq!(summary.success_count, 1);
    let since = scheduler.since().unwrap();

    scheduler.run_cycle(&cancel).await.unwrap();
    let calls = source.calls.lock().clone();
    assert_eq!(calls, vec![None, Some(since)]);
}

#[tokio::test]
async fn test_scheduler_keeps_since_when_items_fail() {
    let harness = Harness::new(FakeDownstream::new());
    harness
        .downstream
        .fail_creates([DownstreamError::Validation("Birim hatalı".to_string())]);
    let source = Arc::new(FakeSource::new(vec![soap("Sabun")]));
    let scheduler = SyncScheduler::new(
        Arc::new(harness.handler(source, 1)),
        Duration::from_secs(300),
    );

    let summary = scheduler.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.failed_count, 1);
    assert!(scheduler.since().is_none());
}

#[tokio::test]
async fn test_warmup_loads_every_page() {
    let downstream = FakeDownstream::new()
        .with_record("ABC-1", 1)
        .with_record("ABC-2", 2)
        .with_record("ABC-3", 3);
    let harness = Harness::new(downstream);
    let warmup = WarmupService::new(
        harness.invoker.clone(),
        harness.cache.clone(),
        WarmupSettings {
            page_size: 2,
            timeout: Duration::from_secs(30),
            max_pages: 10,
        },
    );

    let report = warmup.run(&CancellationToken::new()).await;

    assert_eq!(report.stop, WarmupStop::Exhausted);
    assert_eq!(report.pages, 2);
    assert_eq!(report.loaded, 3);
    assert!(harness.cache.is_warmed().await);
    assert_eq!(harness.cache.get("ABC-3").await, Some(DownstreamId(3)));
}

#[tokio::test]
async fn test_warmup_page_limit_loads_partial_results() {
    let downstream = FakeDownstream::new()
        .with_record("ABC-1", 1)
        .with_record("ABC-2", 2)
        .with_record("ABC-3", 3);
    let harness = Harness::new(downstream);
    let warmup = WarmupService::new(
        harness.invoker.clone(),
        harness.cache.clone(),
        WarmupSettings {
            page_size: 1,
            timeout: Duration::from_secs(30),
            max_pages: 2,
        },
    );

    let report = warmup.run(&CancellationToken::new()).await;

    assert_eq!(report.stop, WarmupStop::MaxPages);
    assert!(!report.stop.is_complete());
    assert_eq!(report.loaded, 2);
    assert_eq!(harness.cache.count().await, 2);
    assert!(!harness.cache.is_warmed().await);
}

#[tokio::test]
async fn test_cancelled_warmup_is_not_marked_warmed() {
    let harness = Harness::new(FakeDownstream::new().with_record("ABC-1", 1));
    let warmup = WarmupService::new(
        harness.invoker.clone(),
        harness.cache.clone(),
        WarmupSettings {
            page_size: 10,
            timeout: Duration::from_secs(30),
            max_pages: 10,
        },
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = warmup.run(&cancel).await;

    assert_eq!(report.stop, WarmupStop::Cancelled);
    assert!(!harness.cache.is_warmed().await);
}
