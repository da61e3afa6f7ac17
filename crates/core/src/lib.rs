pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod store;
pub mod sync;

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use errors::CoreError;
use models::cash::CashAccount;
use models::expense::{Budget, BudgetKind, ExpenseCategory, ExpenseEntry};
use models::holding::{Holding, Market};
use models::settings::Settings;
use models::snapshot::PriceSnapshot;
use models::sync_meta::{SyncMeta, PRICES_DOMAIN};
use models::valuation::{PortfolioOverview, TrendPoint, TrendRange};
use providers::chain::QuoteChain;
use providers::exchange_rate::ExchangeRateProvider;
use services::cash_service::CashService;
use services::expense_service::{BudgetStatus, EntryInput, ExpenseService};
use services::portfolio_service::PortfolioService;
use services::refresh_service::{RefreshReport, RefreshService};
use services::valuation_service::ValuationService;
use store::persist;
use store::records::RecordStore;
use sync::engine::{SharedStore, SyncContext, SyncEngine, SyncReport};
use sync::remote::RemoteStore;

/// Main entry point for the twfolio core library.
///
/// Owns the local record store (shared with the background sync engine) and
/// every service needed to operate on it. All mutations go through here:
/// each one validates, commits locally, stamps the touched rows `pending`,
/// and then best-effort mirrors them to the remote store — a failed mirror
/// never fails the mutation, the periodic sync cycle retries it.
#[must_use]
pub struct PortfolioTracker {
    store: SharedStore,
    portfolio_service: PortfolioService,
    cash_service: CashService,
    expense_service: ExpenseService,
    valuation_service: ValuationService,
    refresh_service: RefreshService,
    tw_chain: QuoteChain,
    us_chain: QuoteChain,
    fx: ExchangeRateProvider,
    remote: Option<Arc<dyn RemoteStore>>,
    engine: Option<Arc<SyncEngine>>,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("signed_in", &self.engine.is_some())
            .field("remote_attached", &self.remote.is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl PortfolioTracker {
    /// Create a brand new empty portfolio with default settings.
    pub fn create_new() -> Self {
        Self::build(RecordStore::new())
    }

    /// Wrap an existing record store (e.g. seeded by tests).
    pub fn from_store(store: RecordStore) -> Self {
        Self::build(store)
    }

    /// Load an existing portfolio from encrypted bytes (password required).
    pub fn load_from_bytes(image: &[u8], password: &str) -> Result<Self, CoreError> {
        let store = persist::open(image, password)?;
        Ok(Self::build(store))
    }

    /// Save the current portfolio to encrypted bytes.
    /// Clears the unsaved-changes flag on success.
    pub async fn save_to_bytes(&mut self, password: &str) -> Result<Vec<u8>, CoreError> {
        let store = self.store.lock().await;
        let bytes = persist::seal(&store, password)?;
        drop(store);
        self.dirty = false;
        Ok(bytes)
    }

    /// Load from an encrypted file on disk (native only, not WASM).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str, password: &str) -> Result<Self, CoreError> {
        let store = persist::load_from_file(path, password)?;
        Ok(Self::build(store))
    }

    /// Save to an encrypted file on disk (native only, not WASM).
    /// Clears the unsaved-changes flag on success.
    #[cfg(not(target_arch = "wasm32"))]
    pub async fn save_to_file(&mut self, path: &str, password: &str) -> Result<(), CoreError> {
        let store = self.store.lock().await;
        persist::save_to_file(&store, path, password)?;
        drop(store);
        self.dirty = false;
        Ok(())
    }

    // ── Session / Sync ──────────────────────────────────────────────

    /// Attach the remote document store mutations mirror to. Must happen
    /// before `sign_in`.
    pub fn attach_remote(&mut self, remote: Arc<dyn RemoteStore>) {
        self.remote = Some(remote);
    }

    /// Open a sync session for a user: builds the engine, runs the initial
    /// cycle, and starts the periodic background cycle.
    ///
    /// A failing initial cycle does not fail sign-in — the local store
    /// stays authoritative and the affected records retry on the next
    /// cycle.
    pub async fn sign_in(&mut self, user_id: &str) -> Result<(), CoreError> {
        let remote = self
            .remote
            .clone()
            .ok_or_else(|| CoreError::Sync("no remote store attached".into()))?;

        let interval = {
            let store = self.store.lock().await;
            Duration::from_secs(store.settings.sync_interval_secs)
        };
        let ctx = SyncContext::new(user_id, interval);
        let engine = Arc::new(SyncEngine::new(ctx, remote, Arc::clone(&self.store)));

        if let Err(e) = engine.sync_now().await {
            warn!(error = %e, "initial sync cycle failed; continuing local-only");
        }
        #[cfg(not(target_arch = "wasm32"))]
        Arc::clone(&engine).start();

        self.engine = Some(engine);
        Ok(())
    }

    /// Tear down the sync session. Local data is untouched.
    pub fn sign_out(&mut self) {
        if let Some(engine) = self.engine.take() {
            #[cfg(not(target_arch = "wasm32"))]
            engine.stop();
            debug!(session = %engine.context().session_id, "signed out");
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.engine.is_some()
    }

    /// Run (or join) a sync cycle now.
    pub async fn sync_now(&self) -> Result<SyncReport, CoreError> {
        match &self.engine {
            Some(engine) => engine.sync_now().await,
            None => Err(CoreError::NotSignedIn),
        }
    }

    /// Notify the engine that connectivity came back.
    pub async fn handle_online(&self) {
        if let Some(engine) = &self.engine {
            engine.handle_online().await;
        }
    }

    /// Shared handle to the underlying store (used by integration tests and
    /// embedders that need read access without the facade).
    pub fn store_handle(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    // ── Holdings ────────────────────────────────────────────────────

    /// Track a new holding. Returns its local id.
    pub async fn add_holding(
        &mut self,
        market: Market,
        symbol: &str,
        company_name: &str,
        shares: f64,
        asset_tag: &str,
    ) -> Result<u64, CoreError> {
        let now = Utc::now();
        let id = {
            let mut store = self.store.lock().await;
            self.portfolio_service
                .add_holding(&mut store, market, symbol, company_name, shares, asset_tag, now)?
        };
        self.after_mutation().await;
        Ok(id)
    }

    pub async fn update_holding_shares(&mut self, id: u64, shares: f64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.portfolio_service.update_shares(&mut store, id, shares, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn retag_holding(&mut self, id: u64, asset_tag: &str) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.portfolio_service.retag(&mut store, id, asset_tag, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn rename_holding(&mut self, id: u64, company_name: &str) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.portfolio_service.rename(&mut store, id, company_name, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    /// Remove a holding. Atomic with its snapshot cascade and the sort
    /// order renumbering of the survivors.
    pub async fn remove_holding(&mut self, id: u64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            let service = &self.portfolio_service;
            store.transaction(|draft| service.remove_holding(draft, id, now))?;
        }
        self.after_mutation().await;
        Ok(())
    }

    /// Reorder active holdings; `ordered_ids` must be exactly the active id
    /// set.
    pub async fn reorder_holdings(&mut self, ordered_ids: &[u64]) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            let service = &self.portfolio_service;
            store.transaction(|draft| service.reorder(draft, ordered_ids, now))?;
        }
        self.after_mutation().await;
        Ok(())
    }

    /// Active holdings ordered by rank.
    pub async fn holdings(&self) -> Vec<Holding> {
        let store = self.store.lock().await;
        store.active_holdings().into_iter().cloned().collect()
    }

    /// All snapshots of one holding, newest first.
    pub async fn price_history(&self, holding_id: u64) -> Vec<PriceSnapshot> {
        let store = self.store.lock().await;
        let mut snapshots: Vec<PriceSnapshot> = store
            .snapshots_for_holding(holding_id)
            .into_iter()
            .filter(|s| s.meta.is_active())
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        snapshots
    }

    // ── Quotes ──────────────────────────────────────────────────────

    /// Fetch a fresh price for every active holding (serialized, throttled)
    /// and append one snapshot per success. Per-holding chain failures land
    /// in the report; a missing USD/TWD rate aborts the batch when US
    /// holdings are present.
    pub async fn refresh_quotes(&mut self) -> Result<RefreshReport, CoreError> {
        let report = self
            .refresh_service
            .refresh_all(&self.store, &self.tw_chain, &self.us_chain, &self.fx)
            .await?;
        self.after_mutation().await;
        Ok(report)
    }

    /// Last quote-refresh status, if a refresh ever ran.
    pub async fn refresh_status(&self) -> Option<SyncMeta> {
        let store = self.store.lock().await;
        store.sync_meta_by_key(PRICES_DOMAIN).cloned()
    }

    // ── Cash accounts ───────────────────────────────────────────────

    pub async fn add_cash_account(
        &mut self,
        bank_name: &str,
        account_alias: &str,
        bank_code: Option<String>,
        balance_twd: f64,
    ) -> Result<u64, CoreError> {
        let now = Utc::now();
        let id = {
            let mut store = self.store.lock().await;
            let service = &self.cash_service;
            store.transaction(|draft| {
                service.add_account(draft, bank_name, account_alias, bank_code.clone(), balance_twd, now)
            })?
        };
        self.after_mutation().await;
        Ok(id)
    }

    pub async fn update_cash_balance(&mut self, id: u64, balance_twd: f64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            let service = &self.cash_service;
            store.transaction(|draft| service.update_balance(draft, id, balance_twd, now))?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn remove_cash_account(&mut self, id: u64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            let service = &self.cash_service;
            store.transaction(|draft| service.remove_account(draft, id, now))?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn cash_accounts(&self) -> Vec<CashAccount> {
        let store = self.store.lock().await;
        store.active_cash_accounts().into_iter().cloned().collect()
    }

    // ── Expenses & budgets ──────────────────────────────────────────

    pub async fn add_expense_category(&mut self, name: &str) -> Result<u64, CoreError> {
        let now = Utc::now();
        let id = {
            let mut store = self.store.lock().await;
            self.expense_service.add_category(&mut store, name, now)?
        };
        self.after_mutation().await;
        Ok(id)
    }

    pub async fn remove_expense_category(&mut self, id: u64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.expense_service.remove_category(&mut store, id, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn add_budget(
        &mut self,
        name: &str,
        kind: BudgetKind,
        amount_twd: f64,
        start_date: NaiveDate,
        category_id: Option<u64>,
    ) -> Result<u64, CoreError> {
        let now = Utc::now();
        let id = {
            let mut store = self.store.lock().await;
            self.expense_service
                .add_budget(&mut store, name, kind, amount_twd, start_date, category_id, now)?
        };
        self.after_mutation().await;
        Ok(id)
    }

    pub async fn remove_budget(&mut self, id: u64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.expense_service.remove_budget(&mut store, id, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn add_expense_entry(&mut self, input: EntryInput) -> Result<u64, CoreError> {
        let now = Utc::now();
        let id = {
            let mut store = self.store.lock().await;
            self.expense_service.add_entry(&mut store, input, now)?
        };
        self.after_mutation().await;
        Ok(id)
    }

    pub async fn update_expense_entry(&mut self, id: u64, input: EntryInput) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.expense_service.update_entry(&mut store, id, input, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn remove_expense_entry(&mut self, id: u64) -> Result<(), CoreError> {
        let now = Utc::now();
        {
            let mut store = self.store.lock().await;
            self.expense_service.remove_entry(&mut store, id, now)?;
        }
        self.after_mutation().await;
        Ok(())
    }

    pub async fn expense_categories(&self) -> Vec<ExpenseCategory> {
        let store = self.store.lock().await;
        store
            .expense_categories
            .iter()
            .filter(|c| c.meta.is_active())
            .cloned()
            .collect()
    }

    pub async fn budgets(&self) -> Vec<Budget> {
        let store = self.store.lock().await;
        store
            .budgets
            .iter()
            .filter(|b| b.meta.is_active())
            .cloned()
            .collect()
    }

    pub async fn expense_entries(&self) -> Vec<ExpenseEntry> {
        let store = self.store.lock().await;
        store.active_expense_entries().into_iter().cloned().collect()
    }

    /// Total spend across active entries in one calendar month.
    pub async fn month_expense_total(&self, year: i32, month: u32) -> f64 {
        let store = self.store.lock().await;
        self.expense_service.month_total(&store, year, month)
    }

    /// Cumulative spend across active entries from each entry's start
    /// through today (Taipei calendar).
    pub async fn cumulative_expense_total(&self) -> f64 {
        let today = Utc::now()
            .with_timezone(&services::valuation_service::taipei())
            .date_naive();
        let store = self.store.lock().await;
        self.expense_service.cumulative_total(&store, today)
    }

    /// Current-cycle consumption of a budget.
    pub async fn budget_status(&self, budget_id: u64) -> Result<BudgetStatus, CoreError> {
        let today = Utc::now()
            .with_timezone(&services::valuation_service::taipei())
            .date_naive();
        let store = self.store.lock().await;
        self.expense_service.budget_status(&store, budget_id, today)
    }

    // ── Valuation ───────────────────────────────────────────────────

    /// Current total value with day-over-day change.
    pub async fn overview(&self) -> PortfolioOverview {
        let store = self.store.lock().await;
        self.valuation_service.overview(&store, Utc::now())
    }

    /// Value series over a range (2/7/30 end-of-day points).
    pub async fn trend(&self, range: TrendRange) -> Vec<TrendPoint> {
        let store = self.store.lock().await;
        self.valuation_service.trend(&store, range, Utc::now())
    }

    // ── Settings ────────────────────────────────────────────────────

    pub async fn settings(&self) -> Settings {
        let store = self.store.lock().await;
        store.settings.clone()
    }

    /// Set an API key for a provider (e.g., "finnhub").
    /// Rebuilds the affected quote chain so the new key takes effect
    /// immediately.
    pub async fn set_api_key(&mut self, provider: &str, key: &str) {
        let settings = {
            let mut store = self.store.lock().await;
            store
                .settings
                .api_keys
                .insert(provider.to_string(), key.to_string());
            store.settings.clone()
        };
        self.us_chain = QuoteChain::for_market(Market::Us, &settings);
        self.dirty = true;
    }

    /// Remove a provider API key. Rebuilds the affected quote chain.
    pub async fn remove_api_key(&mut self, provider: &str) -> bool {
        let (removed, settings) = {
            let mut store = self.store.lock().await;
            let removed = store.settings.api_keys.remove(provider).is_some();
            (removed, store.settings.clone())
        };
        if removed {
            self.us_chain = QuoteChain::for_market(Market::Us, &settings);
            self.dirty = true;
        }
        removed
    }

    /// Replace the holding tag allow-list. Existing holdings keep their
    /// tags; only new assignments are checked against the new list.
    pub async fn set_asset_tags(&mut self, tags: Vec<String>) -> Result<(), CoreError> {
        if tags.is_empty() {
            return Err(CoreError::Validation(
                "Asset tag list must not be empty".into(),
            ));
        }
        let mut store = self.store.lock().await;
        store.settings.asset_tags = tags;
        drop(store);
        self.dirty = true;
        Ok(())
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Returns `true` if the portfolio changed since the last save or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Export the full record store as JSON (unencrypted snapshot for
    /// debugging/display).
    pub async fn to_json(&self) -> Result<String, CoreError> {
        let store = self.store.lock().await;
        serde_json::to_string_pretty(&*store)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize store: {e}")))
    }

    // ── Internal ────────────────────────────────────────────────────

    fn build(store: RecordStore) -> Self {
        let settings = store.settings.clone();
        Self {
            store: Arc::new(Mutex::new(store)),
            portfolio_service: PortfolioService::new(),
            cash_service: CashService::new(),
            expense_service: ExpenseService::new(),
            valuation_service: ValuationService::new(),
            refresh_service: RefreshService::new(),
            tw_chain: QuoteChain::for_market(Market::Tw, &settings),
            us_chain: QuoteChain::for_market(Market::Us, &settings),
            fx: ExchangeRateProvider::new(),
            remote: None,
            engine: None,
            dirty: false,
        }
    }

    /// Post-commit bookkeeping: flag unsaved changes and best-effort mirror
    /// the pending rows. A mirror failure is logged and swallowed — the
    /// rows stay `pending` and the periodic cycle retries them.
    async fn after_mutation(&mut self) {
        self.dirty = true;
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.flush().await {
                debug!(error = %e, "best-effort mirror failed; will retry on next cycle");
            }
        }
    }
}
