use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::record::SyncState;
use crate::store::records::RecordStore;

use super::record::Syncable;
use super::remote::RemoteStore;

/// Shared handle to the local store, so mutations and background cycles can
/// interleave cooperatively.
pub type SharedStore = Arc<Mutex<RecordStore>>;

/// Per-session sync identity and configuration. Created at sign-in, dropped
/// at sign-out; there is deliberately no global sync state.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub user_id: String,

    /// Identifies this device/session in logs; plays no part in conflict
    /// resolution.
    pub session_id: Uuid,

    /// Background cycle period.
    pub interval: Duration,
}

impl SyncContext {
    pub fn new(user_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Uuid::new_v4(),
            interval,
        }
    }
}

/// What one sync cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records merge-written to the remote store.
    pub pushed: usize,
    /// Remote records inserted locally for the first time.
    pub pulled_inserted: usize,
    /// Local records overwritten by newer remote versions.
    pub pulled_updated: usize,
    /// Records whose push failed (now marked `error` for retry).
    pub push_errors: usize,
}

/// Outcome broadcast to callers that joined an in-flight cycle. The error
/// side is a string because the joined callers each need their own copy.
type CycleOutcome = Result<SyncReport, String>;

/// Reconciles the local record store against a per-user remote namespace.
///
/// A cycle is push-then-pull over every collection. At most one cycle runs
/// at a time: a request arriving while one is in flight subscribes to that
/// cycle's outcome instead of racing it. Remote failures never touch local
/// data beyond sync-state bookkeeping — the local store stays authoritative
/// and fully usable offline.
pub struct SyncEngine {
    ctx: SyncContext,
    remote: Arc<dyn RemoteStore>,
    store: SharedStore,

    /// Receiver for the in-flight cycle's outcome, when one is running.
    in_flight: StdMutex<Option<watch::Receiver<Option<CycleOutcome>>>>,

    #[cfg(not(target_arch = "wasm32"))]
    timer: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext, remote: Arc<dyn RemoteStore>, store: SharedStore) -> Self {
        Self {
            ctx,
            remote,
            store,
            in_flight: StdMutex::new(None),
            #[cfg(not(target_arch = "wasm32"))]
            timer: StdMutex::new(None),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Run one sync cycle, or join the one already running.
    ///
    /// On a cycle failure every record still `pending` is downgraded to
    /// `error` so the next cycle retries it, and the error is returned to
    /// the caller. Background triggers (timer, online event) swallow it.
    pub async fn sync_now(&self) -> Result<SyncReport, CoreError> {
        enum Role {
            Leader(watch::Sender<Option<CycleOutcome>>),
            Follower(watch::Receiver<Option<CycleOutcome>>),
        }

        let role = {
            let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut rx) => {
                debug!(session = %self.ctx.session_id, "joining in-flight sync cycle");
                loop {
                    if let Some(outcome) = rx.borrow().clone() {
                        return outcome.map_err(CoreError::Sync);
                    }
                    if rx.changed().await.is_err() {
                        // Leader died without publishing; clear the stale slot.
                        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
                        return Err(CoreError::Sync("sync cycle aborted".into()));
                    }
                }
            }
            Role::Leader(tx) => {
                let result = self.run_cycle().await;
                let shared = result
                    .as_ref()
                    .map(Clone::clone)
                    .map_err(|e| e.to_string());
                *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = None;
                let _ = tx.send(Some(shared));
                result
            }
        }
    }

    /// Push-only pass over every collection: the best-effort mirror run
    /// after a local mutation. Errors leave records pending/error for the
    /// periodic cycle to retry.
    pub async fn flush(&self) -> Result<usize, CoreError> {
        let mut report = SyncReport::default();
        self.push_all(&mut report).await;
        if report.push_errors > 0 {
            return Err(CoreError::Sync(format!(
                "{} record(s) failed to push",
                report.push_errors
            )));
        }
        Ok(report.pushed)
    }

    /// Start the periodic background cycle. Idempotent.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn start(self: Arc<Self>) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_some() {
            return;
        }
        let engine = Arc::clone(&self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.ctx.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(e) = engine.sync_now().await {
                    warn!(error = %e, "background sync cycle failed");
                }
            }
        }));
    }

    /// Stop the periodic background cycle.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn stop(&self) {
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    /// Offline→online transition: run a cycle now, swallowing failure like
    /// any other background trigger.
    pub async fn handle_online(&self) {
        if let Err(e) = self.sync_now().await {
            warn!(error = %e, "online-triggered sync cycle failed");
        }
    }

    // ── Cycle internals ─────────────────────────────────────────────

    async fn run_cycle(&self) -> Result<SyncReport, CoreError> {
        let mut report = SyncReport::default();
        match self.push_and_pull(&mut report).await {
            Ok(()) => {
                debug!(session = %self.ctx.session_id, ?report, "sync cycle complete");
                Ok(report)
            }
            Err(e) => {
                self.downgrade_pending().await;
                Err(e)
            }
        }
    }

    async fn push_and_pull(&self, report: &mut SyncReport) -> Result<(), CoreError> {
        self.push_all(report).await;

        self.pull_collection(|s| &mut s.holdings, report).await?;
        self.pull_collection(|s| &mut s.price_snapshots, report).await?;
        self.pull_collection(|s| &mut s.fx_rates, report).await?;
        self.pull_collection(|s| &mut s.sync_meta, report).await?;
        self.pull_collection(|s| &mut s.cash_accounts, report).await?;
        self.pull_collection(|s| &mut s.cash_balance_snapshots, report)
            .await?;
        self.pull_collection(|s| &mut s.expense_categories, report)
            .await?;
        self.pull_collection(|s| &mut s.budgets, report).await?;
        self.pull_collection(|s| &mut s.expense_entries, report).await?;

        if report.push_errors > 0 {
            return Err(CoreError::Sync(format!(
                "{} record(s) failed to push",
                report.push_errors
            )));
        }
        Ok(())
    }

    async fn push_all(&self, report: &mut SyncReport) {
        self.push_collection(|s| &mut s.holdings, report).await;
        self.push_collection(|s| &mut s.price_snapshots, report).await;
        self.push_collection(|s| &mut s.fx_rates, report).await;
        self.push_collection(|s| &mut s.sync_meta, report).await;
        self.push_collection(|s| &mut s.cash_accounts, report).await;
        self.push_collection(|s| &mut s.cash_balance_snapshots, report)
            .await;
        self.push_collection(|s| &mut s.expense_categories, report)
            .await;
        self.push_collection(|s| &mut s.budgets, report).await;
        self.push_collection(|s| &mut s.expense_entries, report).await;
    }

    /// Push every pending/error record of one collection. Tombstones push
    /// like any other record so deletions reach other devices.
    async fn push_collection<T: Syncable>(
        &self,
        access: fn(&mut RecordStore) -> &mut Vec<T>,
        report: &mut SyncReport,
    ) {
        // Snapshot the candidates so the store lock is not held across
        // network awaits.
        let candidates: Vec<(u64, DateTime<Utc>, String, Value)> = {
            let mut store = self.store.lock().await;
            access(&mut store)
                .iter()
                .filter(|r| {
                    matches!(
                        r.meta().sync_state,
                        SyncState::Pending | SyncState::Error
                    )
                })
                .filter_map(|r| {
                    let doc = serde_json::to_value(r).ok()?;
                    Some((r.local_id(), r.meta().updated_at, r.remote_key(), doc))
                })
                .collect()
        };

        for (id, pushed_at, key, doc) in candidates {
            let outcome = self
                .remote
                .merge(&self.ctx.user_id, T::COLLECTION, &key, doc)
                .await;

            let mut store = self.store.lock().await;
            let Some(record) = access(&mut store).iter_mut().find(|r| r.local_id() == id)
            else {
                continue;
            };
            match outcome {
                Ok(()) => {
                    report.pushed += 1;
                    // Only settle if the record didn't change while the
                    // write was in flight.
                    if record.meta().updated_at == pushed_at {
                        record.meta_mut().sync_state = SyncState::Synced;
                    }
                }
                Err(e) => {
                    warn!(collection = %T::COLLECTION, key = %key, error = %e, "push failed");
                    record.meta_mut().sync_state = SyncState::Error;
                    report.push_errors += 1;
                }
            }
        }
    }

    /// Pull one collection and reconcile by natural key.
    ///
    /// Conflict rule: remote overwrites local fields — never the local id,
    /// never the local sync state — iff remote `updated_at` is strictly
    /// newer; ties and remote-older are no-ops (local priority). Known
    /// weakness carried over deliberately: `updated_at` comes from each
    /// device's wall clock, so a skewed clock can silently win or lose a
    /// genuinely concurrent edit. A per-record version counter would fix
    /// this but would break compatibility with the existing data.
    async fn pull_collection<T: Syncable>(
        &self,
        access: fn(&mut RecordStore) -> &mut Vec<T>,
        report: &mut SyncReport,
    ) -> Result<(), CoreError> {
        let docs = self
            .remote
            .fetch_all(&self.ctx.user_id, T::COLLECTION)
            .await?;

        let mut store = self.store.lock().await;
        for (key, doc) in docs {
            let incoming: T = match serde_json::from_value(doc) {
                Ok(record) => record,
                Err(e) => {
                    warn!(collection = %T::COLLECTION, key = %key, error = %e, "skipping unreadable remote document");
                    continue;
                }
            };

            let incoming_key = incoming.remote_key();
            let existing = access(&mut store)
                .iter()
                .position(|r| r.remote_key() == incoming_key);

            match existing {
                None => {
                    let id = store.allocate_id();
                    let mut fresh = incoming;
                    fresh.set_local_id(id);
                    fresh.meta_mut().sync_state = SyncState::Synced;
                    access(&mut store).push(fresh);
                    report.pulled_inserted += 1;
                }
                Some(i) => {
                    let local = &mut access(&mut store)[i];
                    if incoming.meta().updated_at > local.meta().updated_at {
                        let mut replacement = incoming;
                        replacement.set_local_id(local.local_id());
                        replacement.meta_mut().sync_state = local.meta().sync_state;
                        *local = replacement;
                        report.pulled_updated += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Mark every still-pending record as `error` after a failed cycle.
    async fn downgrade_pending(&self) {
        fn mark<T: Syncable>(records: &mut [T]) {
            for record in records {
                if record.meta().sync_state == SyncState::Pending {
                    record.meta_mut().sync_state = SyncState::Error;
                }
            }
        }

        let mut store = self.store.lock().await;
        mark(&mut store.holdings);
        mark(&mut store.price_snapshots);
        mark(&mut store.fx_rates);
        mark(&mut store.sync_meta);
        mark(&mut store.cash_accounts);
        mark(&mut store.cash_balance_snapshots);
        mark(&mut store.expense_categories);
        mark(&mut store.budgets);
        mark(&mut store.expense_entries);
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
