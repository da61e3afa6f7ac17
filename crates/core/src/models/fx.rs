use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// Currency pair key for the only rate this crate tracks.
pub const USD_TWD: &str = "USD_TWD";

/// Latest known exchange rate for a currency pair. Singleton per pair —
/// refreshing overwrites the row rather than appending history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub id: u64,

    /// Pair label, e.g. "USD_TWD".
    pub pair: String,

    pub rate: f64,

    pub fetched_at: DateTime<Utc>,

    /// Label of the upstream that produced the rate.
    pub source: String,

    pub meta: RecordMeta,
}

impl FxRate {
    pub fn natural_key(&self) -> String {
        self.pair.clone()
    }
}
