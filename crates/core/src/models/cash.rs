use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// A bank/cash account tracked alongside stock holdings.
/// Identified across devices by (bank name, account alias).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashAccount {
    pub id: u64,

    pub bank_name: String,

    /// User-chosen alias distinguishing accounts at the same bank.
    pub account_alias: String,

    /// Optional bank routing code.
    #[serde(default)]
    pub bank_code: Option<String>,

    /// Current balance in TWD (non-negative).
    pub balance_twd: f64,

    pub meta: RecordMeta,
}

impl CashAccount {
    pub fn natural_key(&self) -> String {
        format!("{}:{}", self.bank_name, self.account_alias)
    }
}

/// Balance history point for a cash account.
///
/// Written on every balance-changing mutation. An update writes two rows:
/// a synthetic "before" snapshot stamped one millisecond earlier carrying the
/// prior balance, then the new balance — so history never has an ambiguous
/// gap. Deleting an account appends a zero-balance snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBalanceSnapshot {
    pub id: u64,

    /// Local id of the owning account.
    pub account_id: u64,

    /// Denormalized account identity for cross-device natural keys.
    pub bank_name: String,
    pub account_alias: String,

    pub balance_twd: f64,

    pub captured_at: DateTime<Utc>,

    pub meta: RecordMeta,
}

impl CashBalanceSnapshot {
    pub fn natural_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.bank_name,
            self.account_alias,
            self.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}
