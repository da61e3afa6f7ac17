use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// The market a holding trades on. Determines which quote chain serves it
/// and whether an FX conversion to TWD is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// Taiwan (TWSE listed or TPEx over-the-counter) — quoted in TWD.
    Tw,
    /// United States — quoted in USD, valued via the USD/TWD rate.
    Us,
}

impl Market {
    /// Normalize a raw user-entered symbol for this market.
    /// TW codes are numeric and pass through trimming unchanged; US tickers
    /// are uppercased.
    pub fn normalize_symbol(&self, raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// Native quote currency of this market.
    pub fn currency(&self) -> &'static str {
        match self {
            Market::Tw => "TWD",
            Market::Us => "USD",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Market::Tw => write!(f, "TW"),
            Market::Us => write!(f, "US"),
        }
    }
}

/// A tracked stock position.
///
/// At most one *active* holding may exist per (market, symbol); the natural
/// key is what matches records across devices, never the local `id`.
/// `sort_order` is a dense 1..N ranking over active holdings, renumbered
/// whenever a holding is removed or the user reorders the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Locally-assigned identity; never leaves this device's store semantics.
    pub id: u64,

    pub market: Market,

    /// Uppercase, market-normalized ticker or stock code.
    pub symbol: String,

    pub company_name: String,

    /// User classification, validated against the configurable tag list
    /// in `Settings`.
    pub asset_tag: String,

    /// Number of shares held (always positive).
    pub shares: f64,

    /// Dense 1-based rank among active holdings.
    pub sort_order: u32,

    pub meta: RecordMeta,
}

impl Holding {
    /// Composite key used to match this holding across local and remote
    /// stores, e.g. `"TW:2330"` or `"US:AAPL"`.
    pub fn natural_key(&self) -> String {
        format!("{}:{}", self.market, self.symbol)
    }
}
