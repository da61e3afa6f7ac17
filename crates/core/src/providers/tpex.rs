use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;
use tracing::debug;

use crate::errors::CoreError;
use super::parse_price_field;
use super::traits::{Quote, QuoteSource};

/// Mirror base URLs for the TPEx mainboard snapshot, tried in order.
/// The first is the exchange itself; the second routes through a CORS
/// proxy that tends to answer when the exchange throttles direct callers.
const MIRROR_URLS: &[&str] = &[
    "https://www.tpex.org.tw/openapi/v1/tpex_mainboard_quotes",
    "https://corsproxy.io/?https://www.tpex.org.tw/openapi/v1/tpex_mainboard_quotes",
];

/// Attempts per mirror before moving to the next one.
const ATTEMPTS_PER_URL: u32 = 2;

/// Per-attempt timeout. The TPEx endpoint hangs rather than erroring when
/// it is overloaded, so each attempt is cancelled after this long.
#[cfg(not(target_arch = "wasm32"))]
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// TPEx over-the-counter mainboard snapshot, for TW symbols that are not
/// TWSE-listed. Last rung of the TW fallback chain.
pub struct TpexSource {
    client: Client,
}

impl TpexSource {
    pub fn new() -> Self {
        // Per-attempt deadlines are set on each request, not on the client.
        Self {
            client: Client::new(),
        }
    }

    async fn fetch_rows(&self, url: &str) -> Result<Vec<OtcRow>, CoreError> {
        let request = self.client.get(url);
        #[cfg(not(target_arch = "wasm32"))]
        let request = request.timeout(ATTEMPT_TIMEOUT);

        let rows = request
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Provider {
                provider: "TPEx".into(),
                message: format!("Failed to parse OTC snapshot: {e}"),
            })?;
        Ok(rows)
    }
}

impl Default for TpexSource {
    fn default() -> Self {
        Self::new()
    }
}

// ── TPEx API response types ─────────────────────────────────────────

#[derive(Deserialize)]
struct OtcRow {
    #[serde(rename = "SecuritiesCompanyCode")]
    code: Option<String>,
    #[serde(rename = "Close")]
    close: Option<String>,
    #[serde(rename = "CompanyName")]
    company_name: Option<String>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteSource for TpexSource {
    fn name(&self) -> &str {
        "TPEx"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let mut last_error = None;

        for url in MIRROR_URLS {
            for attempt in 1..=ATTEMPTS_PER_URL {
                match self.fetch_rows(url).await {
                    Ok(rows) => {
                        let row = rows
                            .iter()
                            .find(|r| r.code.as_deref() == Some(symbol))
                            .ok_or_else(|| CoreError::Provider {
                                provider: "TPEx".into(),
                                message: format!("Symbol {symbol} not in OTC snapshot"),
                            })?;

                        let price = row
                            .close
                            .as_deref()
                            .and_then(parse_price_field)
                            .ok_or_else(|| CoreError::Provider {
                                provider: "TPEx".into(),
                                message: format!("No usable close for {symbol} in OTC snapshot"),
                            })?;

                        return Ok(Quote {
                            price,
                            currency: "TWD".into(),
                            name: row.company_name.clone(),
                        });
                    }
                    Err(e) => {
                        debug!(url = %url, attempt, error = %e, "TPEx attempt failed");
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::Provider {
            provider: "TPEx".into(),
            message: format!("No data for {symbol}"),
        }))
    }
}
