use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;

const BASE_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Label recorded as the `FxRate.source` for rates fetched here.
pub const SOURCE_LABEL: &str = "open.er-api.com";

/// A freshly fetched USD→TWD rate.
#[derive(Debug, Clone, PartialEq)]
pub struct FxQuote {
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Single-upstream USD→TWD exchange rate fetcher.
///
/// No fallback and no retry: the caller decides whether a missing rate is
/// fatal (it is for any US-market valuation, and not for TW-only work).
pub struct ExchangeRateProvider {
    client: Client,
}

impl ExchangeRateProvider {
    pub fn new() -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
        }
    }

    /// Fetch the current USD→TWD rate.
    ///
    /// Fails with `FxUnavailable` on any network error, non-OK status, or a
    /// missing/non-finite/non-positive rate.
    pub async fn usd_twd(&self) -> Result<FxQuote, CoreError> {
        let response = self
            .client
            .get(BASE_URL)
            .send()
            .await
            .map_err(|e| CoreError::FxUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::FxUnavailable(format!(
                "upstream returned HTTP {}",
                response.status()
            )));
        }

        let resp: RatesResponse = response
            .json()
            .await
            .map_err(|e| CoreError::FxUnavailable(format!("unparseable response: {e}")))?;

        let rate = resp
            .rates
            .unwrap_or_default()
            .get("TWD")
            .copied()
            .unwrap_or(0.0);

        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::FxUnavailable(format!(
                "no usable TWD rate in response (got {rate})"
            )));
        }

        Ok(FxQuote {
            rate,
            fetched_at: Utc::now(),
        })
    }
}

impl Default for ExchangeRateProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── Exchange-rate API response types ────────────────────────────────

#[derive(Deserialize)]
struct RatesResponse {
    rates: Option<HashMap<String, f64>>,
}
