use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use super::parse_price_field;
use super::traits::{Quote, QuoteSource};

const BASE_URL: &str = "https://openapi.twse.com.tw/v1/exchangeReport/STOCK_DAY_ALL";

/// TWSE full-market daily closing snapshot.
///
/// One unkeyed request returns every listed symbol's latest close as
/// `[{Code, Name, ClosingPrice}]`; we scan for ours. Heavier than the
/// monthly table but works when the monthly endpoint is down or empty.
pub struct TwseDailySource {
    client: Client,
}

impl TwseDailySource {
    pub fn new() -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
        }
    }
}

impl Default for TwseDailySource {
    fn default() -> Self {
        Self::new()
    }
}

// ── TWSE API response types ─────────────────────────────────────────

#[derive(Deserialize)]
struct DailyRow {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "ClosingPrice")]
    closing_price: Option<String>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteSource for TwseDailySource {
    fn name(&self) -> &str {
        "TWSE daily snapshot"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let rows: Vec<DailyRow> = self
            .client
            .get(BASE_URL)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Provider {
                provider: "TWSE daily snapshot".into(),
                message: format!("Failed to parse market snapshot: {e}"),
            })?;

        let row = rows
            .iter()
            .find(|r| r.code.as_deref() == Some(symbol))
            .ok_or_else(|| CoreError::Provider {
                provider: "TWSE daily snapshot".into(),
                message: format!("Symbol {symbol} not in market snapshot"),
            })?;

        let price = row
            .closing_price
            .as_deref()
            .and_then(parse_price_field)
            .ok_or_else(|| CoreError::Provider {
                provider: "TWSE daily snapshot".into(),
                message: format!("No usable close for {symbol} in market snapshot"),
            })?;

        Ok(Quote {
            price,
            currency: "TWD".into(),
            name: row.name.clone(),
        })
    }
}
