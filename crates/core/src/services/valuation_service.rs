use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::models::cash::CashAccount;
use crate::models::holding::Holding;
use crate::models::valuation::{PortfolioOverview, TrendPoint, TrendRange};
use crate::store::records::RecordStore;

/// Reference time zone for day boundaries: Taiwan (UTC+8, no DST).
pub fn taipei() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

/// End-of-day cutoff for a Taipei calendar day, as a UTC instant
/// (23:59:59.999 local).
pub fn end_of_day_utc(day: NaiveDate) -> DateTime<Utc> {
    let local = day.and_hms_milli_opt(23, 59, 59, 999).unwrap();
    local
        .and_local_timezone(taipei())
        .unwrap()
        .with_timezone(&Utc)
}

/// The baseline instant for day-over-day change: end of the most recently
/// fully completed Taipei calendar day.
pub fn baseline_instant(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.with_timezone(&taipei()).date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);
    end_of_day_utc(yesterday)
}

/// Point-in-time portfolio valuation from sparse snapshot history.
///
/// Read-only over the record store — never mutates it. Historical totals
/// come from "latest snapshot at-or-before" lookups; a snapshot captured
/// exactly at a cutoff counts as at-or-before.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Current total value: active holdings valued from their latest live
    /// snapshot (price × shares × fx, falling back to the snapshot's stored
    /// TWD value when the price is unusable) plus active cash balances.
    pub fn current_total(&self, store: &RecordStore) -> f64 {
        let holdings: f64 = store
            .active_holdings()
            .iter()
            .map(|h| Self::current_holding_value(store, h))
            .sum();
        let cash: f64 = store
            .active_cash_accounts()
            .iter()
            .map(|a| a.balance_twd)
            .sum();
        holdings + cash
    }

    /// Total value at the baseline instant, with the legacy fallbacks for
    /// sparse history (see `baseline_cash_value`).
    pub fn baseline_total(&self, store: &RecordStore, baseline: DateTime<Utc>) -> f64 {
        let holdings: f64 = store
            .holdings
            .iter()
            .filter(|h| !h.meta.deleted_at_or_before(baseline))
            .map(|h| Self::baseline_holding_value(store, h, baseline))
            .sum();
        let cash: f64 = store
            .cash_accounts
            .iter()
            .filter(|a| !a.meta.deleted_at_or_before(baseline))
            .map(|a| Self::baseline_cash_value(store, a, baseline))
            .sum();
        holdings + cash
    }

    /// Current value with day-over-day change against the baseline.
    pub fn overview(&self, store: &RecordStore, now: DateTime<Utc>) -> PortfolioOverview {
        let baseline = baseline_instant(now);
        let total_twd = self.current_total(store);
        let baseline_twd = self.baseline_total(store, baseline);
        let change_twd = total_twd - baseline_twd;
        let change_pct = if baseline_twd.is_finite() && baseline_twd != 0.0 {
            Some(change_twd / baseline_twd * 100.0)
        } else {
            None
        };
        PortfolioOverview {
            as_of: now,
            total_twd,
            baseline_twd,
            change_twd,
            change_pct,
        }
    }

    /// Value series over the requested range: one point per completed
    /// Taipei calendar day, oldest first, ending at the baseline day.
    pub fn trend(
        &self,
        store: &RecordStore,
        range: TrendRange,
        now: DateTime<Utc>,
    ) -> Vec<TrendPoint> {
        let today = now.with_timezone(&taipei()).date_naive();
        let last_day = match today.pred_opt() {
            Some(day) => day,
            None => return Vec::new(),
        };

        let points = range.points();
        let mut series = Vec::with_capacity(points);
        for back in (0..points).rev() {
            let day = last_day - chrono::Duration::days(back as i64);
            let cutoff = end_of_day_utc(day);
            series.push(TrendPoint {
                cutoff,
                total_twd: self.total_at_cutoff(store, cutoff),
            });
        }
        series
    }

    /// Total value at a historical cutoff: for every holding and cash
    /// account not yet deleted at the cutoff, the latest snapshot at or
    /// before it (no legacy fallbacks — missing history contributes 0).
    pub fn total_at_cutoff(&self, store: &RecordStore, cutoff: DateTime<Utc>) -> f64 {
        let holdings: f64 = store
            .holdings
            .iter()
            .filter(|h| !h.meta.deleted_at_or_before(cutoff))
            .filter_map(|h| Self::holding_snapshot_at(store, h.id, cutoff))
            .sum();
        let cash: f64 = store
            .cash_accounts
            .iter()
            .filter(|a| !a.meta.deleted_at_or_before(cutoff))
            .filter_map(|a| Self::cash_snapshot_at(store, a.id, cutoff))
            .sum();
        holdings + cash
    }

    // ── Internals ───────────────────────────────────────────────────

    fn current_holding_value(store: &RecordStore, holding: &Holding) -> f64 {
        let latest = store
            .price_snapshots
            .iter()
            .filter(|s| s.holding_id == holding.id && s.meta.is_active())
            .max_by_key(|s| s.captured_at);

        match latest {
            Some(s) if s.price.is_finite() && s.price > 0.0 => {
                s.price * holding.shares * s.fx_rate_to_twd
            }
            Some(s) => s.value_twd,
            None => 0.0,
        }
    }

    /// Stored TWD value of the holding's latest snapshot at-or-before the
    /// cutoff, skipping snapshots already soft-deleted by then.
    fn holding_snapshot_at(
        store: &RecordStore,
        holding_id: u64,
        cutoff: DateTime<Utc>,
    ) -> Option<f64> {
        store
            .price_snapshots
            .iter()
            .filter(|s| {
                s.holding_id == holding_id
                    && !s.meta.deleted_at_or_before(cutoff)
                    && s.captured_at <= cutoff
            })
            .max_by_key(|s| s.captured_at)
            .map(|s| s.value_twd)
    }

    fn cash_snapshot_at(
        store: &RecordStore,
        account_id: u64,
        cutoff: DateTime<Utc>,
    ) -> Option<f64> {
        store
            .cash_balance_snapshots
            .iter()
            .filter(|s| {
                s.account_id == account_id
                    && !s.meta.deleted_at_or_before(cutoff)
                    && s.captured_at <= cutoff
            })
            .max_by_key(|s| s.captured_at)
            .map(|s| s.balance_twd)
    }

    /// Baseline value of one holding: snapshot at-or-before the baseline,
    /// else the earliest snapshot after it (approximation for holdings
    /// created since). Holdings carry no stored value of their own, so
    /// there is no further fallback.
    fn baseline_holding_value(
        store: &RecordStore,
        holding: &Holding,
        baseline: DateTime<Utc>,
    ) -> f64 {
        if let Some(value) = Self::holding_snapshot_at(store, holding.id, baseline) {
            return value;
        }
        store
            .price_snapshots
            .iter()
            .filter(|s| {
                s.holding_id == holding.id
                    && !s.meta.deleted_at_or_before(baseline)
                    && s.captured_at > baseline
            })
            .min_by_key(|s| s.captured_at)
            .map(|s| s.value_twd)
            .unwrap_or(0.0)
    }

    /// Baseline value of one cash account, in fallback order: snapshot
    /// at-or-before the baseline; earliest snapshot after it; and for
    /// legacy accounts untouched since the baseline with no snapshot
    /// history at all, the current stored balance.
    fn baseline_cash_value(
        store: &RecordStore,
        account: &CashAccount,
        baseline: DateTime<Utc>,
    ) -> f64 {
        if let Some(balance) = Self::cash_snapshot_at(store, account.id, baseline) {
            return balance;
        }

        let first_after = store
            .cash_balance_snapshots
            .iter()
            .filter(|s| {
                s.account_id == account.id
                    && !s.meta.deleted_at_or_before(baseline)
                    && s.captured_at > baseline
            })
            .min_by_key(|s| s.captured_at);
        if let Some(s) = first_after {
            return s.balance_twd;
        }

        if account.meta.updated_at <= baseline {
            account.balance_twd
        } else {
            0.0
        }
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}
