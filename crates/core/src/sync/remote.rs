use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;

/// The remote document collections, one per local entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Holdings,
    PriceSnapshots,
    FxRates,
    SyncMeta,
    CashAccounts,
    CashBalanceSnapshots,
    ExpenseCategories,
    Budgets,
    ExpenseEntries,
}

impl Collection {
    /// Every collection, in the order the push phase visits them.
    pub const ALL: [Collection; 9] = [
        Collection::Holdings,
        Collection::PriceSnapshots,
        Collection::FxRates,
        Collection::SyncMeta,
        Collection::CashAccounts,
        Collection::CashBalanceSnapshots,
        Collection::ExpenseCategories,
        Collection::Budgets,
        Collection::ExpenseEntries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Holdings => "holdings",
            Collection::PriceSnapshots => "price_snapshots",
            Collection::FxRates => "fx_rates",
            Collection::SyncMeta => "sync_meta",
            Collection::CashAccounts => "cash_accounts",
            Collection::CashBalanceSnapshots => "cash_balance_snapshots",
            Collection::ExpenseCategories => "expense_categories",
            Collection::Budgets => "budgets",
            Collection::ExpenseEntries => "expense_entries",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-user remote document namespace.
///
/// Documents are keyed by natural-key strings and written with merge
/// (partial-update) semantics; implementations stamp a server-assigned
/// `server_updated_at` on every write. Writes are idempotent per key —
/// there is no cross-record transaction, which is why the push phase does
/// not need a snapshot-before-holding ordering.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RemoteStore: Send + Sync {
    /// Fetch every document in one collection for a user.
    async fn fetch_all(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<HashMap<String, Value>, CoreError>;

    /// Merge-write one document at its natural-key path.
    async fn merge(
        &self,
        user_id: &str,
        collection: Collection,
        key: &str,
        doc: Value,
    ) -> Result<(), CoreError>;
}

// ── In-memory implementation ────────────────────────────────────────

/// In-process remote store: the reference implementation used by tests and
/// local development. Supports a fail mode to simulate a remote outage and
/// counts writes so idempotence is observable.
#[derive(Default)]
pub struct MemoryRemoteStore {
    /// (user, collection) → key → document.
    docs: Mutex<HashMap<(String, &'static str), HashMap<String, Value>>>,
    failing: AtomicBool,
    writes: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (simulated outage) or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total merge-writes accepted since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Direct document lookup, for assertions.
    pub fn get(&self, user_id: &str, collection: Collection, key: &str) -> Option<Value> {
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.get(&(user_id.to_string(), collection.as_str()))
            .and_then(|c| c.get(key))
            .cloned()
    }

    fn check_up(&self) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CoreError::Sync("remote store unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_all(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<HashMap<String, Value>, CoreError> {
        self.check_up()?;
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(docs
            .get(&(user_id.to_string(), collection.as_str()))
            .cloned()
            .unwrap_or_default())
    }

    async fn merge(
        &self,
        user_id: &str,
        collection: Collection,
        key: &str,
        doc: Value,
    ) -> Result<(), CoreError> {
        self.check_up()?;
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        let slot = docs
            .entry((user_id.to_string(), collection.as_str()))
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));

        // Merge: incoming fields overwrite, absent fields survive.
        match (slot.as_object_mut(), doc) {
            (Some(existing), Value::Object(incoming)) => {
                for (field, value) in incoming {
                    existing.insert(field, value);
                }
                existing.insert(
                    "server_updated_at".to_string(),
                    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
            (_, doc) => *slot = doc,
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── HTTP implementation ─────────────────────────────────────────────

/// Remote store backed by a JSON document API:
/// `GET  {base}/users/{uid}/{collection}` → `{key: doc, ...}`
/// `PATCH {base}/users/{uid}/{collection}/{key}` with the document body.
/// The server performs the merge and stamps `server_updated_at`.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(
        &self,
        user_id: &str,
        collection: Collection,
    ) -> Result<HashMap<String, Value>, CoreError> {
        let url = format!("{}/users/{user_id}/{collection}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Sync(format!("fetch {collection} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Sync(format!(
                "fetch {collection} returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CoreError::Sync(format!("unparseable {collection} response: {e}")))
    }

    async fn merge(
        &self,
        user_id: &str,
        collection: Collection,
        key: &str,
        doc: Value,
    ) -> Result<(), CoreError> {
        let url = format!("{}/users/{user_id}/{collection}/{key}", self.base_url);
        let response = self
            .client
            .patch(&url)
            .json(&doc)
            .send()
            .await
            .map_err(|e| CoreError::Sync(format!("merge {collection}/{key} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Sync(format!(
                "merge {collection}/{key} returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
