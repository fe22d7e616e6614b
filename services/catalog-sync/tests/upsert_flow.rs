mod common;

use std::sync::Arc;
use std::time::Duration;

use catalog_sync::application::{
    RemoteLockSettings, SyncedVia, UpsertOrchestrator, UpsertStatus,
};
use catalog_sync::domain::entities::{ProductMapping, SourceProduct};
use catalog_sync::domain::enums::MappingStatus;
use catalog_sync::domain::gateways::{DownstreamError, PayloadDefaults};
use catalog_sync::domain::repositories::MappingRepository;
use catalog_sync::domain::services::VersioningPolicy;
use catalog_sync::domain::value_objects::{DownstreamId, SourceProductId};
use common::{FakeDownstream, Harness, product};
use tokio_util::sync::CancellationToken;

async fn seed(harness: &Harness, product: SourceProduct) -> ProductMapping {
    let decision = VersioningPolicy::default().decide(product, None);
    let mapping = decision.pending().cloned().unwrap();
    harness.repository.insert_first(&mapping).await.unwrap();
    mapping
}

async fn active(harness: &Harness, id: &str) -> ProductMapping {
    harness
        .repository
        .find_active(&SourceProductId::new(id))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_create_then_cache_hit() {
    let harness = Harness::new(FakeDownstream::new());
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kırmızı Kalem")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping.clone(), &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Synced);
    assert_eq!(outcome.via, Some(SyncedVia::Created));
    assert!(outcome.create_called);
    let id = outcome.downstream_id.unwrap();
    assert_eq!(harness.cache.get("ABC-1").await, Some(id));

    let stored = active(&harness, "p-1").await;
    assert_eq!(stored.status(), MappingStatus::Synced);
    assert_eq!(stored.downstream_id(), Some(id));

    // 第二次走缓存，不再访问下游
    let again = harness
        .orchestrator
        .upsert(stored, &CancellationToken::new())
        .await;
    assert_eq!(again.via, Some(SyncedVia::Cache));
    assert_eq!(harness.downstream.find_count(), 1);
    assert_eq!(harness.downstream.create_count(), 1);
}

#[tokio::test]
async fn test_duplicate_code_counts_as_synced() {
    let harness = Harness::new(FakeDownstream::new());
    harness.downstream.fail_creates([DownstreamError::Conflict {
        existing_id: Some(DownstreamId(77)),
        message: "Kart kodu daha önce kullanılmış".to_string(),
    }]);
    let mapping = seed(&harness, product("p-1", "9340003", "Sabun")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Synced);
    assert_eq!(outcome.via, Some(SyncedVia::Conflict));
    assert_eq!(outcome.downstream_id, Some(DownstreamId(77)));
    assert_eq!(harness.cache.get("9340003").await, Some(DownstreamId(77)));
    assert_eq!(active(&harness, "p-1").await.status(), MappingStatus::Synced);
}

#[tokio::test]
async fn test_conflict_without_id_is_filled_by_lookup() {
    let harness = Harness::new(FakeDownstream::new().with_late_record("9340003", 88));
    harness.downstream.fail_creates([DownstreamError::Conflict {
        existing_id: None,
        message: "HTTP 409 Conflict".to_string(),
    }]);
    let mapping = seed(&harness, product("p-1", "9340003", "Sabun")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Synced);
    assert_eq!(outcome.via, Some(SyncedVia::Conflict));
    assert_eq!(outcome.downstream_id, Some(DownstreamId(88)));
    assert_eq!(harness.downstream.find_count(), 2);
    assert_eq!(harness.cache.get("9340003").await, Some(DownstreamId(88)));
    assert_eq!(active(&harness, "p-1").await.downstream_id(), Some(DownstreamId(88)));
}

#[tokio::test]
async fn test_conflict_without_id_and_no_record_still_synced() {
    let harness = Harness::new(FakeDownstream::new());
    harness.downstream.fail_creates([DownstreamError::Conflict {
        existing_id: None,
        message: "HTTP 409 Conflict".to_string(),
    }]);
    let mapping = seed(&harness, product("p-1", "9340003", "Sabun")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Synced);
    assert_eq!(outcome.downstream_id, None);
    assert_eq!(harness.downstream.find_count(), 2);
    assert_eq!(active(&harness, "p-1").await.status(), MappingStatus::Synced);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_upserts_of_one_code_create_once() {
    let downstream = FakeDownstream::new()
        .accepting_duplicates()
        .with_create_delay(Duration::from_secs(1));
    let harness = Harness::new(downstream);

    let mut mappings = Vec::new();
    for i in 0..5 {
        mappings.push(seed(&harness, product(&format!("p-{}", i), "ABC-1", "Kalem")).await);
    }

    let summary = harness
        .batch(5)
        .run(mappings, &CancellationToken::new())
        .await;

    assert_eq!(summary.total_count, 5);
    assert_eq!(summary.success_count, 5);
    assert_eq!(harness.downstream.create_count(), 1);
    assert_eq!(harness.downstream.find_count(), 1);

    let ids: Vec<_> = summary.items.iter().map(|i| i.downstream_id).collect();
    assert!(ids.iter().all(|id| *id == ids[0] && id.is_some()));
}

/// 与 harness 共享缓存后端和下游、但各自持有本地锁的另一个副本
fn replica(harness: &Harness) -> UpsertOrchestrator {
    UpsertOrchestrator::new(
        harness.cache.clone(),
        harness.invoker.clone(),
        harness.repository.clone(),
        PayloadDefaults::default(),
    )
    .with_distributed_lock(
        harness.store.clone(),
        RemoteLockSettings {
            poll_interval: Duration::from_millis(50),
            ..RemoteLockSettings::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_replicas_do_not_create_the_same_code_twice() {
    let downstream = FakeDownstream::new()
        .accepting_duplicates()
        .with_create_delay(Duration::from_secs(1));
    let harness = Harness::new(downstream);
    let first = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;
    let second = seed(&harness, product("p-2", "ABC-1", "Kalem")).await;
    let (a, b) = (replica(&harness), replica(&harness));
    let cancel = CancellationToken::new();

    let (left, right) = tokio::join!(a.upsert(first, &cancel), b.upsert(second, &cancel));

    assert_eq!(left.status, UpsertStatus::Synced);
    assert_eq!(right.status, UpsertStatus::Synced);
    assert_eq!(harness.downstream.create_count(), 1);
    assert_eq!(harness.downstream.find_count(), 1);
    assert_eq!(left.downstream_id, right.downstream_id);
}

#[tokio::test]
async fn test_cache_miss_heals_from_lookup() {
    let harness = Harness::new(FakeDownstream::new().with_record("ABC-1", 501));
    let mapping = seed(&harness, product("p-1", "abc-1", "Kalem")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.via, Some(SyncedVia::Lookup));
    assert_eq!(outcome.downstream_id, Some(DownstreamId(501)));
    assert!(!outcome.create_called);
    assert_eq!(harness.cache.get("ABC-1").await, Some(DownstreamId(501)));
}

#[tokio::test]
async fn test_cache_outage_degrades_to_lookup() {
    let harness = Harness::new(FakeDownstream::new().with_record("ABC-1", 501));
    harness.store.set_unavailable(true);
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Synced);
    assert_eq!(outcome.via, Some(SyncedVia::Lookup));
    assert_eq!(harness.downstream.create_count(), 0);
    assert!(!harness.cache.status().await.healthy);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let harness = Harness::new(FakeDownstream::new());
    harness.downstream.fail_creates([
        DownstreamError::Transient("HTTP 503".to_string()),
        DownstreamError::Transient("connection reset".to_string()),
    ]);
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Synced);
    assert_eq!(outcome.via, Some(SyncedVia::Created));
    assert_eq!(harness.downstream.create_count(), 3);
    assert_eq!(harness.downstream.login_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_exhaust_into_failure() {
    let harness = Harness::new(FakeDownstream::new());
    harness
        .downstream
        .fail_finds((0..4).map(|_| DownstreamError::Transient("HTTP 502".to_string())));
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Failed);
    assert_eq!(harness.downstream.find_count(), 4);
    assert_eq!(harness.downstream.create_count(), 0);
    assert_eq!(active(&harness, "p-1").await.status(), MappingStatus::Failed);
}

#[tokio::test]
async fn test_validation_error_fails_without_retry() {
    let harness = Harness::new(FakeDownstream::new());
    harness
        .downstream
        .fail_creates([DownstreamError::Validation("Kart adı boş olamaz".to_string())]);
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;

    let outcome = harness
        .orchestrator
        .upsert(mapping, &CancellationToken::new())
        .await;

    assert_eq!(outcome.status, UpsertStatus::Failed);
    assert!(outcome.error.unwrap().contains("Kart adı boş olamaz"));
    assert_eq!(harness.downstream.create_count(), 1);

    let stored = active(&harness, "p-1").await;
    assert_eq!(stored.status(), MappingStatus::Failed);
    assert!(stored.error_message().unwrap().contains("Kart adı boş olamaz"));
    assert_eq!(harness.cache.get("ABC-1").await, None);
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_mapping_pending() {
    let harness = Harness::new(FakeDownstream::new());
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = harness.orchestrator.upsert(mapping, &cancel).await;

    assert_eq!(outcome.status, UpsertStatus::Cancelled);
    assert_eq!(harness.downstream.login_count(), 0);
    assert_eq!(active(&harness, "p-1").await.status(), MappingStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_flight_create_leaves_mapping_pending() {
    let harness = Arc::new(Harness::new(
        FakeDownstream::new().with_create_delay(Duration::from_secs(30)),
    ));
    let mapping = seed(&harness, product("p-1", "ABC-1", "Kalem")).await;
    let cancel = CancellationToken::new();

    let task = {
        let harness = harness.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { harness.orchestrator.upsert(mapping, &cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    let outcome = task.await.unwrap();
    assert_eq!(outcome.status, UpsertStatus::Cancelled);
    assert_eq!(active(&harness, "p-1").await.status(), MappingStatus::Pending);
}
