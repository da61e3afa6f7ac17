use chrono::{DateTime, Duration, Utc};

use crate::errors::CoreError;
use crate::models::cash::{CashAccount, CashBalanceSnapshot};
use crate::models::record::RecordMeta;
use crate::store::records::RecordStore;

/// Cash-account mutations plus their balance history.
///
/// Every balance-changing mutation leaves a snapshot trail: creation writes
/// the opening balance, an update writes the prior balance one millisecond
/// before the new one, and deletion closes the history with a zero row.
pub struct CashService;

impl CashService {
    pub fn new() -> Self {
        Self
    }

    /// Add a cash account and its opening balance snapshot.
    pub fn add_account(
        &self,
        store: &mut RecordStore,
        bank_name: &str,
        account_alias: &str,
        bank_code: Option<String>,
        balance_twd: f64,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let bank_name = bank_name.trim();
        let account_alias = account_alias.trim();
        if bank_name.is_empty() || account_alias.is_empty() {
            return Err(CoreError::Validation(
                "Bank name and account alias must not be empty".into(),
            ));
        }
        Self::validate_balance(balance_twd)?;

        let duplicate = store
            .cash_accounts
            .iter()
            .any(|a| {
                a.meta.is_active() && a.bank_name == bank_name && a.account_alias == account_alias
            });
        if duplicate {
            return Err(CoreError::Validation(format!(
                "Cash account {bank_name}:{account_alias} already exists"
            )));
        }

        let id = store.allocate_id();
        let account = CashAccount {
            id,
            bank_name: bank_name.to_string(),
            account_alias: account_alias.to_string(),
            bank_code,
            balance_twd,
            meta: RecordMeta::new(now),
        };
        Self::write_snapshot(store, &account, balance_twd, now, now);
        store.cash_accounts.push(account);
        Ok(id)
    }

    /// Set a new balance, preserving the prior value in history via a
    /// synthetic "before" snapshot stamped 1 ms earlier.
    pub fn update_balance(
        &self,
        store: &mut RecordStore,
        id: u64,
        balance_twd: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        Self::validate_balance(balance_twd)?;

        let (account, previous) = {
            let account = Self::active_account_mut(store, id)?;
            let previous = account.balance_twd;
            account.balance_twd = balance_twd;
            account.meta.touch(now);
            (account.clone(), previous)
        };

        Self::write_snapshot(store, &account, previous, now - Duration::milliseconds(1), now);
        Self::write_snapshot(store, &account, balance_twd, now, now);
        Ok(())
    }

    /// Soft-delete an account, closing its history with a zero balance.
    pub fn remove_account(
        &self,
        store: &mut RecordStore,
        id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let account = {
            let account = Self::active_account_mut(store, id)?;
            account.meta.soft_delete(now);
            account.clone()
        };
        Self::write_snapshot(store, &account, 0.0, now, now);
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn validate_balance(balance_twd: f64) -> Result<(), CoreError> {
        if !balance_twd.is_finite() || balance_twd < 0.0 {
            return Err(CoreError::Validation(format!(
                "Balance must be a non-negative finite number, got {balance_twd}"
            )));
        }
        Ok(())
    }

    fn active_account_mut(
        store: &mut RecordStore,
        id: u64,
    ) -> Result<&mut CashAccount, CoreError> {
        store
            .cash_accounts
            .iter_mut()
            .find(|a| a.id == id && a.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Cash account", id.to_string()))
    }

    fn write_snapshot(
        store: &mut RecordStore,
        account: &CashAccount,
        balance_twd: f64,
        captured_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let id = store.allocate_id();
        store.cash_balance_snapshots.push(CashBalanceSnapshot {
            id,
            account_id: account.id,
            bank_name: account.bank_name.clone(),
            account_alias: account.account_alias.clone(),
            balance_twd,
            captured_at,
            meta: RecordMeta::new(now),
        });
    }
}

impl Default for CashService {
    fn default() -> Self {
        Self::new()
    }
}
