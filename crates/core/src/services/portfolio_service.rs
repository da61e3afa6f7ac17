use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::CoreError;
use crate::models::holding::{Holding, Market};
use crate::models::record::RecordMeta;
use crate::store::records::RecordStore;

/// Holding mutations and their invariants: unique active (market, symbol),
/// dense 1..N sort order, soft-delete cascade onto snapshots.
///
/// Pure business logic — no I/O. Multi-row operations are meant to run
/// inside `RecordStore::transaction` so a validation failure midway leaves
/// nothing half-applied.
pub struct PortfolioService;

impl PortfolioService {
    pub fn new() -> Self {
        Self
    }

    /// Add a new holding at the bottom of the sort order.
    /// Returns the new local id.
    pub fn add_holding(
        &self,
        store: &mut RecordStore,
        market: Market,
        symbol: &str,
        company_name: &str,
        shares: f64,
        asset_tag: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let symbol = market.normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(CoreError::Validation("Symbol must not be empty".into()));
        }
        Self::validate_shares(shares)?;
        self.validate_tag(store, asset_tag)?;

        if store.active_holding_by_key(market, &symbol).is_some() {
            return Err(CoreError::Validation(format!(
                "Holding {market}:{symbol} is already tracked"
            )));
        }

        let sort_order = store.active_holdings().len() as u32 + 1;
        let id = store.allocate_id();
        store.holdings.push(Holding {
            id,
            market,
            symbol,
            company_name: company_name.trim().to_string(),
            asset_tag: asset_tag.to_string(),
            shares,
            sort_order,
            meta: RecordMeta::new(now),
        });
        Ok(id)
    }

    /// Change the share count of an active holding.
    pub fn update_shares(
        &self,
        store: &mut RecordStore,
        id: u64,
        shares: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        Self::validate_shares(shares)?;
        let holding = Self::active_holding_mut(store, id)?;
        holding.shares = shares;
        holding.meta.touch(now);
        Ok(())
    }

    /// Reclassify an active holding.
    pub fn retag(
        &self,
        store: &mut RecordStore,
        id: u64,
        asset_tag: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.validate_tag(store, asset_tag)?;
        let holding = Self::active_holding_mut(store, id)?;
        holding.asset_tag = asset_tag.to_string();
        holding.meta.touch(now);
        Ok(())
    }

    /// Update the display name of an active holding.
    pub fn rename(
        &self,
        store: &mut RecordStore,
        id: u64,
        company_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let holding = Self::active_holding_mut(store, id)?;
        holding.company_name = company_name.trim().to_string();
        holding.meta.touch(now);
        Ok(())
    }

    /// Soft-delete a holding, cascade onto its price snapshots, and
    /// renumber the surviving active holdings to a dense 1..N preserving
    /// their relative order.
    pub fn remove_holding(
        &self,
        store: &mut RecordStore,
        id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        {
            let holding = Self::active_holding_mut(store, id)?;
            holding.meta.soft_delete(now);
        }

        for snapshot in store
            .price_snapshots
            .iter_mut()
            .filter(|s| s.holding_id == id && s.meta.is_active())
        {
            snapshot.meta.soft_delete(now);
        }

        Self::renumber(store, now);
        Ok(())
    }

    /// Apply a user-submitted ordering. The id list must be exactly the
    /// current active holding ids, each exactly once.
    pub fn reorder(
        &self,
        store: &mut RecordStore,
        ordered_ids: &[u64],
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let submitted: HashSet<u64> = ordered_ids.iter().copied().collect();
        if submitted.len() != ordered_ids.len() {
            return Err(CoreError::Validation(
                "Reorder list contains duplicate ids".into(),
            ));
        }
        let active: HashSet<u64> = store.active_holdings().iter().map(|h| h.id).collect();
        if submitted != active {
            return Err(CoreError::Validation(
                "Reorder list must contain every active holding exactly once".into(),
            ));
        }

        for (position, id) in ordered_ids.iter().enumerate() {
            let rank = position as u32 + 1;
            if let Some(holding) = store.holding_by_id_mut(*id) {
                if holding.sort_order != rank {
                    holding.sort_order = rank;
                    holding.meta.touch(now);
                }
            }
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn validate_shares(shares: f64) -> Result<(), CoreError> {
        if !shares.is_finite() || shares <= 0.0 {
            return Err(CoreError::Validation(format!(
                "Share count must be a positive finite number, got {shares}"
            )));
        }
        Ok(())
    }

    fn validate_tag(&self, store: &RecordStore, asset_tag: &str) -> Result<(), CoreError> {
        if !store.settings.asset_tags.iter().any(|t| t == asset_tag) {
            return Err(CoreError::Validation(format!(
                "Unknown asset tag '{asset_tag}' (allowed: {})",
                store.settings.asset_tags.join(", ")
            )));
        }
        Ok(())
    }

    fn active_holding_mut(store: &mut RecordStore, id: u64) -> Result<&mut Holding, CoreError> {
        store
            .holdings
            .iter_mut()
            .find(|h| h.id == id && h.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Holding", id.to_string()))
    }

    /// Compact active sort orders into 1..N, keeping relative order.
    /// Only rows whose rank actually changed are re-stamped for sync.
    fn renumber(store: &mut RecordStore, now: DateTime<Utc>) {
        let mut active: Vec<(u32, u64)> = store
            .holdings
            .iter()
            .filter(|h| h.meta.is_active())
            .map(|h| (h.sort_order, h.id))
            .collect();
        active.sort_by_key(|(order, _)| *order);

        for (position, (_, id)) in active.into_iter().enumerate() {
            let rank = position as u32 + 1;
            if let Some(holding) = store.holding_by_id_mut(id) {
                if holding.sort_order != rank {
                    holding.sort_order = rank;
                    holding.meta.touch(now);
                }
            }
        }
    }
}

impl Default for PortfolioService {
    fn default() -> Self {
        Self::new()
    }
}
