// ═══════════════════════════════════════════════════════════════════
// Sync Tests — push/pull cycle, last-write-wins, single-flight, outage
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use twfolio_core::errors::CoreError;
use twfolio_core::models::holding::{Holding, Market};
use twfolio_core::models::record::SyncState;
use twfolio_core::services::portfolio_service::PortfolioService;
use twfolio_core::store::records::RecordStore;
use twfolio_core::sync::engine::{SyncContext, SyncEngine};
use twfolio_core::sync::remote::{Collection, MemoryRemoteStore, RemoteStore};

const USER: &str = "user-1";

fn shared(store: RecordStore) -> Arc<Mutex<RecordStore>> {
    Arc::new(Mutex::new(store))
}

fn engine_for(
    remote: Arc<dyn RemoteStore>,
    store: Arc<Mutex<RecordStore>>,
) -> SyncEngine {
    SyncEngine::new(
        SyncContext::new(USER, Duration::from_secs(30)),
        remote,
        store,
    )
}

fn store_with_holding() -> RecordStore {
    let mut store = RecordStore::new();
    PortfolioService::new()
        .add_holding(
            &mut store,
            Market::Tw,
            "2330",
            "TSMC",
            100.0,
            "Core",
            Utc::now(),
        )
        .unwrap();
    store
}

async fn first_holding(store: &Arc<Mutex<RecordStore>>) -> Holding {
    let store = store.lock().await;
    store.active_holdings()[0].clone()
}

// ── Push ────────────────────────────────────────────────────────────

#[tokio::test]
async fn push_marks_records_synced_and_writes_remote_docs() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store = shared(store_with_holding());
    let engine = engine_for(remote.clone(), store.clone());

    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert_eq!(report.push_errors, 0);

    let holding = first_holding(&store).await;
    assert_eq!(holding.meta.sync_state, SyncState::Synced);

    let doc = remote
        .get(USER, Collection::Holdings, "TW:2330")
        .expect("document written at natural-key path");
    assert_eq!(doc["symbol"], "2330");
    assert!(doc["server_updated_at"].is_string());
}

#[tokio::test]
async fn flush_pushes_without_pulling() {
    let remote = Arc::new(MemoryRemoteStore::new());
    // A foreign record another device wrote earlier.
    remote
        .merge(
            USER,
            Collection::Holdings,
            "US:AAPL",
            serde_json::json!({
                "id": 9, "market": "Us", "symbol": "AAPL", "company_name": "Apple Inc.",
                "asset_tag": "Growth", "shares": 5.0, "sort_order": 1,
                "meta": {"updated_at": "2024-01-01T00:00:00Z", "sync_state": "synced"}
            }),
        )
        .await
        .unwrap();

    let store = shared(store_with_holding());
    let engine = engine_for(remote.clone(), store.clone());

    let pushed = engine.flush().await.unwrap();
    assert_eq!(pushed, 1);

    // Mirror is push-only: the foreign record was not pulled in.
    let store = store.lock().await;
    assert!(store.active_holding_by_key(Market::Us, "AAPL").is_none());
}

// ── Pull & last-write-wins ──────────────────────────────────────────

#[tokio::test]
async fn pull_inserts_unknown_records_as_synced() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store_a = shared(store_with_holding());
    engine_for(remote.clone(), store_a.clone())
        .sync_now()
        .await
        .unwrap();

    // A second device starts empty and pulls everything.
    let store_b = shared(RecordStore::new());
    let report = engine_for(remote.clone(), store_b.clone())
        .sync_now()
        .await
        .unwrap();
    assert_eq!(report.pulled_inserted, 1);

    let original = first_holding(&store_a).await;
    let replica = first_holding(&store_b).await;

    // Round-trip: field-for-field equality except the local identity.
    assert_eq!(replica.natural_key(), original.natural_key());
    assert_eq!(replica.shares, original.shares);
    assert_eq!(replica.company_name, original.company_name);
    assert_eq!(replica.asset_tag, original.asset_tag);
    assert_eq!(replica.sort_order, original.sort_order);
    assert_eq!(replica.meta.updated_at, original.meta.updated_at);
    assert_eq!(replica.meta.sync_state, SyncState::Synced);
}

#[tokio::test]
async fn newer_remote_overwrites_local_fields_but_not_identity() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store = shared(store_with_holding());
    let engine = engine_for(remote.clone(), store.clone());
    engine.sync_now().await.unwrap();

    let local = first_holding(&store).await;

    // Another device edited the same holding with a later clock.
    let mut foreign = local.clone();
    foreign.id = 999; // their local id, meaningless here
    foreign.shares = 42.0;
    foreign.meta.updated_at = local.meta.updated_at + ChronoDuration::hours(1);
    remote
        .merge(
            USER,
            Collection::Holdings,
            &foreign.natural_key(),
            serde_json::to_value(&foreign).unwrap(),
        )
        .await
        .unwrap();

    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.pulled_updated, 1);

    let merged = first_holding(&store).await;
    assert_eq!(merged.shares, 42.0);
    assert_eq!(merged.id, local.id, "local identity must survive the pull");
    assert_eq!(merged.meta.updated_at, foreign.meta.updated_at);
}

#[tokio::test]
async fn equal_or_older_remote_timestamps_keep_local() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store = shared(store_with_holding());
    let engine = engine_for(remote.clone(), store.clone());
    engine.sync_now().await.unwrap();

    let local = first_holding(&store).await;

    // Tie: identical timestamp, different payload — local priority.
    let mut tied = local.clone();
    tied.shares = 500.0;
    remote
        .merge(
            USER,
            Collection::Holdings,
            &tied.natural_key(),
            serde_json::to_value(&tied).unwrap(),
        )
        .await
        .unwrap();
    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.pulled_updated, 0);
    assert_eq!(first_holding(&store).await.shares, local.shares);

    // Older: earlier timestamp — also a no-op.
    let mut stale = local.clone();
    stale.shares = 1.0;
    stale.meta.updated_at = local.meta.updated_at - ChronoDuration::hours(1);
    remote
        .merge(
            USER,
            Collection::Holdings,
            &stale.natural_key(),
            serde_json::to_value(&stale).unwrap(),
        )
        .await
        .unwrap();
    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.pulled_updated, 0);
    assert_eq!(first_holding(&store).await.shares, local.shares);
}

#[tokio::test]
async fn tombstones_propagate_to_other_devices() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store_a = shared(store_with_holding());
    let engine_a = engine_for(remote.clone(), store_a.clone());
    engine_a.sync_now().await.unwrap();

    let store_b = shared(RecordStore::new());
    let engine_b = engine_for(remote.clone(), store_b.clone());
    engine_b.sync_now().await.unwrap();
    assert!(first_holding(&store_b).await.meta.is_active());

    // Device A deletes; deletion must reach device B.
    {
        let mut store = store_a.lock().await;
        let id = store.active_holdings()[0].id;
        store
            .transaction(|draft| {
                PortfolioService::new().remove_holding(draft, id, Utc::now())
            })
            .unwrap();
    }
    engine_a.sync_now().await.unwrap();
    engine_b.sync_now().await.unwrap();

    let store_b = store_b.lock().await;
    assert!(store_b.active_holdings().is_empty());
    assert!(store_b.holdings[0].meta.is_deleted());
}

// ── Idempotence ─────────────────────────────────────────────────────

#[tokio::test]
async fn second_cycle_with_no_mutations_writes_nothing() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store = shared(store_with_holding());
    let engine = engine_for(remote.clone(), store.clone());

    engine.sync_now().await.unwrap();
    let writes_after_first = remote.write_count();

    let report = engine.sync_now().await.unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.pulled_inserted, 0);
    assert_eq!(report.pulled_updated, 0);
    assert_eq!(remote.write_count(), writes_after_first);
}

// ── Outage & recovery ───────────────────────────────────────────────

#[tokio::test]
async fn outage_downgrades_pending_records_then_recovers() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let store = shared(store_with_holding());
    let engine = engine_for(remote.clone(), store.clone());

    remote.set_failing(true);
    let err = engine.sync_now().await.unwrap_err();
    assert!(matches!(err, CoreError::Sync(_)));
    assert_eq!(first_holding(&store).await.meta.sync_state, SyncState::Error);

    // Any later successful cycle repairs the state.
    remote.set_failing(false);
    engine.sync_now().await.unwrap();
    assert_eq!(
        first_holding(&store).await.meta.sync_state,
        SyncState::Synced
    );
}

// ── Single flight ───────────────────────────────────────────────────

/// Remote that yields mid-operation so overlapping cycles actually overlap.
struct SlowRemote {
    inner: MemoryRemoteStore,
}

#[async_trait]
impl RemoteStore for SlowRemote {
    async fn fetch_all(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<HashMap<String, Value>, CoreError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.inner.fetch_all(user_id, collection).await
    }

    async fn merge(
        &self,
        user_id: &str,
        collection: Collection,
        key: &str,
        doc: Value,
    ) -> Result<(), CoreError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.inner.merge(user_id, collection, key, doc).await
    }
}

#[tokio::test]
async fn concurrent_requests_join_the_inflight_cycle() {
    let slow = Arc::new(SlowRemote {
        inner: MemoryRemoteStore::new(),
    });
    let store = shared(store_with_holding());
    let engine = engine_for(slow.clone(), store);

    let (a, b) = tokio::join!(engine.sync_now(), engine.sync_now());
    let a = a.unwrap();
    let b = b.unwrap();

    // Both callers observed the same single cycle: one push write total.
    assert_eq!(a, b);
    assert_eq!(a.pushed, 1);
    assert_eq!(slow.inner.write_count(), 1);
}
