use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default sync interval while signed in.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

fn default_asset_tags() -> Vec<String> {
    ["Core", "Growth", "Dividend", "Bond", "ETF", "Other"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

/// User-configurable settings, persisted inside the encrypted store image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Optional API keys for providers that require them.
    /// Keys: provider name (e.g., "finnhub"). Values: the API key string.
    pub api_keys: HashMap<String, String>,

    /// Allowed holding classification tags; `add_holding` rejects anything
    /// not on this list.
    #[serde(default = "default_asset_tags")]
    pub asset_tags: Vec<String>,

    /// Background sync period in seconds.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            asset_tags: default_asset_tags(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
        }
    }
}
