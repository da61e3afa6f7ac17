use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::Deserialize;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use super::parse_price_field;
use super::traits::{Quote, QuoteSource};

const BASE_URL: &str = "https://www.twse.com.tw/exchangeReport/STOCK_DAY";

/// Index of the closing price column in a STOCK_DAY row:
/// date, volume, value, open, high, low, close, change, transactions.
const CLOSE_COLUMN: usize = 6;

/// How many months to scan, newest first, before giving up.
const MONTHS_TO_SCAN: u32 = 3;

/// TWSE monthly daily-price table for listed TW stocks.
///
/// One request per month (`?date=YYYYMM01&stockNo=CODE`); the most recent
/// row with a usable close wins. Early in a month the current table can be
/// empty or all-placeholder, so the scan walks back up to three months.
pub struct TwseMonthlySource {
    client: Client,
}

impl TwseMonthlySource {
    pub fn new() -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
        }
    }

    async fn fetch_month(&self, symbol: &str, year: i32, month: u32) -> Result<f64, CoreError> {
        let date_param = format!("{year:04}{month:02}01");
        let resp: MonthlyTable = self
            .client
            .get(BASE_URL)
            .query(&[
                ("response", "json"),
                ("date", date_param.as_str()),
                ("stockNo", symbol),
            ])
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Provider {
                provider: "TWSE monthly".into(),
                message: format!("Failed to parse table for {symbol} {date_param}: {e}"),
            })?;

        if resp.stat.as_deref() != Some("OK") {
            return Err(CoreError::Provider {
                provider: "TWSE monthly".into(),
                message: format!(
                    "Rejected request for {symbol} {date_param}: {}",
                    resp.stat.unwrap_or_else(|| "no stat field".into())
                ),
            });
        }

        // Rows are oldest-first; scan from the end for the newest valid close.
        let rows = resp.data.unwrap_or_default();
        rows.iter()
            .rev()
            .find_map(|row| {
                row.get(CLOSE_COLUMN)
                    .and_then(cell_as_str)
                    .and_then(|s| parse_price_field(&s))
            })
            .ok_or_else(|| CoreError::Provider {
                provider: "TWSE monthly".into(),
                message: format!("No usable close for {symbol} in {year:04}-{month:02}"),
            })
    }
}

impl Default for TwseMonthlySource {
    fn default() -> Self {
        Self::new()
    }
}

// ── TWSE API response types ─────────────────────────────────────────

#[derive(Deserialize)]
struct MonthlyTable {
    stat: Option<String>,
    /// Day rows as heterogeneous cells (strings, occasionally numbers).
    #[serde(default)]
    data: Option<Vec<Vec<serde_json::Value>>>,
}

fn cell_as_str(cell: &serde_json::Value) -> Option<String> {
    match cell {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteSource for TwseMonthlySource {
    fn name(&self) -> &str {
        "TWSE monthly"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let today = Utc::now().date_naive();
        let (mut year, mut month) = (today.year(), today.month());
        let mut last_error = None;

        for _ in 0..MONTHS_TO_SCAN {
            match self.fetch_month(symbol, year, month).await {
                Ok(price) => {
                    return Ok(Quote {
                        price,
                        currency: "TWD".into(),
                        name: None,
                    })
                }
                Err(e) => last_error = Some(e),
            }
            (year, month) = previous_month(year, month);
        }

        Err(last_error.unwrap_or_else(|| CoreError::Provider {
            provider: "TWSE monthly".into(),
            message: format!("No data for {symbol}"),
        }))
    }
}
