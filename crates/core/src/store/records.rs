use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::cash::{CashAccount, CashBalanceSnapshot};
use crate::models::expense::{Budget, ExpenseCategory, ExpenseEntry};
use crate::models::fx::FxRate;
use crate::models::holding::{Holding, Market};
use crate::models::settings::Settings;
use crate::models::snapshot::PriceSnapshot;
use crate::models::sync_meta::SyncMeta;

/// The local, offline-first record store: one typed collection per entity
/// kind plus user settings. This is the single source of truth — the remote
/// store is only ever a mirror of it.
///
/// Records are appended and soft-deleted, never removed, so collections are
/// also the full history. The whole struct serializes into the encrypted
/// at-rest image (see `store::persist`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStore {
    pub holdings: Vec<Holding>,
    pub price_snapshots: Vec<PriceSnapshot>,
    pub fx_rates: Vec<FxRate>,
    pub sync_meta: Vec<SyncMeta>,
    pub cash_accounts: Vec<CashAccount>,
    pub cash_balance_snapshots: Vec<CashBalanceSnapshot>,
    pub expense_categories: Vec<ExpenseCategory>,
    pub budgets: Vec<Budget>,
    pub expense_entries: Vec<ExpenseEntry>,

    pub settings: Settings,

    /// Monotonic local id source, shared across collections.
    next_id: u64,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self {
            holdings: Vec::new(),
            price_snapshots: Vec::new(),
            fx_rates: Vec::new(),
            sync_meta: Vec::new(),
            cash_accounts: Vec::new(),
            cash_balance_snapshots: Vec::new(),
            expense_categories: Vec::new(),
            budgets: Vec::new(),
            expense_entries: Vec::new(),
            settings: Settings::default(),
            next_id: 1,
        }
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next local id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Run a multi-row mutation all-or-nothing: the closure operates on a
    /// draft copy and the draft replaces the live store only on success.
    /// Any error leaves the store exactly as it was.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut RecordStore) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut draft = self.clone();
        let out = f(&mut draft)?;
        *self = draft;
        Ok(out)
    }

    // ── Holdings ────────────────────────────────────────────────────

    /// Active (non-deleted) holdings ordered by `sort_order`.
    pub fn active_holdings(&self) -> Vec<&Holding> {
        let mut active: Vec<&Holding> = self
            .holdings
            .iter()
            .filter(|h| h.meta.is_active())
            .collect();
        active.sort_by_key(|h| h.sort_order);
        active
    }

    pub fn holding_by_id(&self, id: u64) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.id == id)
    }

    pub fn holding_by_id_mut(&mut self, id: u64) -> Option<&mut Holding> {
        self.holdings.iter_mut().find(|h| h.id == id)
    }

    /// Active holding with the given natural identity, if any.
    pub fn active_holding_by_key(&self, market: Market, symbol: &str) -> Option<&Holding> {
        self.holdings
            .iter()
            .find(|h| h.meta.is_active() && h.market == market && h.symbol == symbol)
    }

    /// All snapshots belonging to a holding, soft-deleted ones included.
    pub fn snapshots_for_holding(&self, holding_id: u64) -> Vec<&PriceSnapshot> {
        self.price_snapshots
            .iter()
            .filter(|s| s.holding_id == holding_id)
            .collect()
    }

    // ── Cash ────────────────────────────────────────────────────────

    pub fn active_cash_accounts(&self) -> Vec<&CashAccount> {
        self.cash_accounts
            .iter()
            .filter(|a| a.meta.is_active())
            .collect()
    }

    pub fn cash_account_by_id(&self, id: u64) -> Option<&CashAccount> {
        self.cash_accounts.iter().find(|a| a.id == id)
    }

    pub fn cash_account_by_id_mut(&mut self, id: u64) -> Option<&mut CashAccount> {
        self.cash_accounts.iter_mut().find(|a| a.id == id)
    }

    // ── FX / sync meta ──────────────────────────────────────────────

    pub fn fx_rate_by_pair(&self, pair: &str) -> Option<&FxRate> {
        self.fx_rates
            .iter()
            .find(|r| r.pair == pair && r.meta.is_active())
    }

    pub fn sync_meta_by_key(&self, key: &str) -> Option<&SyncMeta> {
        self.sync_meta.iter().find(|m| m.key == key)
    }

    // ── Expenses ────────────────────────────────────────────────────

    pub fn active_expense_entries(&self) -> Vec<&ExpenseEntry> {
        self.expense_entries
            .iter()
            .filter(|e| e.meta.is_active())
            .collect()
    }

    pub fn expense_entry_by_id(&self, id: u64) -> Option<&ExpenseEntry> {
        self.expense_entries.iter().find(|e| e.id == id)
    }

    pub fn category_by_id(&self, id: u64) -> Option<&ExpenseCategory> {
        self.expense_categories.iter().find(|c| c.id == id)
    }

    pub fn budget_by_id(&self, id: u64) -> Option<&Budget> {
        self.budgets.iter().find(|b| b.id == id)
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Total record count across all collections (tombstones included).
    pub fn record_count(&self) -> usize {
        self.holdings.len()
            + self.price_snapshots.len()
            + self.fx_rates.len()
            + self.sync_meta.len()
            + self.cash_accounts.len()
            + self.cash_balance_snapshots.len()
            + self.expense_categories.len()
            + self.budgets.len()
            + self.expense_entries.len()
    }
}
