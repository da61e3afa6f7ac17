use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// Fixed key for the quote-refresh status domain.
pub const PRICES_DOMAIN: &str = "prices";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshOutcome {
    Ok,
    Error,
}

/// Last refresh status for one sync domain, keyed by a fixed label.
///
/// Purely user-facing status — never consulted for conflict resolution of
/// business data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta {
    pub id: u64,

    /// Fixed domain key, e.g. "prices".
    pub key: String,

    #[serde(default)]
    pub last_refresh_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_outcome: Option<RefreshOutcome>,

    /// Human-readable status detail (error text on failure).
    #[serde(default)]
    pub message: Option<String>,

    pub meta: RecordMeta,
}

impl SyncMeta {
    pub fn natural_key(&self) -> String {
        self.key.clone()
    }
}
