use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use super::traits::{Quote, QuoteSource};

const BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub real-time quote endpoint for US-listed symbols.
///
/// - **Requires**: API key (settings key "finnhub").
/// - **Endpoint**: `/quote?symbol=S&token=KEY` → `{"c": last_price, ...}`.
/// - Invalid symbols come back as `c = 0`, not an HTTP error — treated as
///   "no quote", never as a zero price.
pub struct FinnhubSource {
    client: Client,
    api_key: String,
}

impl FinnhubSource {
    pub fn new(api_key: String) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }
}

// ── Finnhub API response types ──────────────────────────────────────

#[derive(Deserialize)]
struct QuoteResponse {
    /// Current/last price.
    c: Option<f64>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteSource for FinnhubSource {
    fn name(&self) -> &str {
        "Finnhub"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let resp: QuoteResponse = self
            .client
            .get(format!("{BASE_URL}/quote"))
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Provider {
                provider: "Finnhub".into(),
                message: format!("Failed to parse quote for {symbol}: {e}"),
            })?;

        let price = resp.c.unwrap_or(0.0);
        if !price.is_finite() || price <= 0.0 {
            return Err(CoreError::Provider {
                provider: "Finnhub".into(),
                message: format!("No quote found for {symbol}"),
            });
        }

        Ok(Quote {
            price,
            currency: "USD".into(),
            name: None,
        })
    }
}
