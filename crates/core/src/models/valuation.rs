use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current portfolio value with day-over-day change against the baseline
/// (end of the most recently completed Taipei calendar day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioOverview {
    pub as_of: DateTime<Utc>,

    /// Total value right now: holdings (latest snapshots) + cash balances.
    pub total_twd: f64,

    /// Total value at the baseline instant.
    pub baseline_twd: f64,

    /// total_twd − baseline_twd.
    pub change_twd: f64,

    /// change / baseline × 100; `None` when the baseline is zero or
    /// non-finite.
    pub change_pct: Option<f64>,
}

/// One point of a value-over-time series, at an end-of-day cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// End-of-day boundary (23:59:59.999 Taipei) this total was taken at.
    pub cutoff: DateTime<Utc>,

    pub total_twd: f64,
}

/// Requested trend window. Each range maps to a fixed number of completed
/// calendar days, one point per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendRange {
    /// Last 24 hours — 2 points (yesterday and the day before).
    Day,
    /// Last 7 completed days.
    Week,
    /// Last 30 completed days.
    Month,
}

impl TrendRange {
    pub fn points(&self) -> usize {
        match self {
            TrendRange::Day => 2,
            TrendRange::Week => 7,
            TrendRange::Month => 30,
        }
    }
}

impl std::fmt::Display for TrendRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendRange::Day => write!(f, "24h"),
            TrendRange::Week => write!(f, "7d"),
            TrendRange::Month => write!(f, "30d"),
        }
    }
}
