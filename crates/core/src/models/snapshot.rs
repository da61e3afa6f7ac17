use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::holding::Market;
use super::record::RecordMeta;

/// A point-in-time valuation of one holding.
///
/// Owned by exactly one `Holding` and soft-deleted together with it.
/// `value_twd` is precomputed at capture time (`price × shares × fx`) so
/// historical totals never depend on later share counts or rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: u64,

    /// Local id of the owning holding.
    pub holding_id: u64,

    /// Market/symbol are denormalized into the snapshot so its natural key
    /// survives cross-device merges where local ids differ.
    pub market: Market,
    pub symbol: String,

    /// Price in the market's native currency.
    pub price: f64,

    /// Currency the price is denominated in ("TWD" or "USD").
    pub currency: String,

    /// USD/TWD rate applied at capture time; 1.0 for TW holdings.
    pub fx_rate_to_twd: f64,

    /// price × shares × fx_rate_to_twd, in TWD.
    pub value_twd: f64,

    pub captured_at: DateTime<Utc>,

    pub meta: RecordMeta,
}

impl PriceSnapshot {
    pub fn natural_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.market,
            self.symbol,
            self.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}
