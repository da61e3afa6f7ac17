use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::fx::{FxRate, USD_TWD};
use crate::models::holding::Market;
use crate::models::record::RecordMeta;
use crate::models::snapshot::PriceSnapshot;
use crate::models::sync_meta::{RefreshOutcome, SyncMeta, PRICES_DOMAIN};
use crate::providers::chain::QuoteChain;
use crate::providers::exchange_rate::{ExchangeRateProvider, SOURCE_LABEL};
use crate::store::records::RecordStore;
use crate::sync::engine::SharedStore;

/// Minimum pause between consecutive quote fetches in one batch. The TW
/// endpoints publish no rate limits but throttle aggressive callers, so the
/// batch is strictly serialized with this gap.
pub const INTER_REQUEST_DELAY: Duration = Duration::from_millis(1200);

/// What one refresh batch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Holdings that got a fresh price snapshot.
    pub refreshed: usize,
    /// (symbol, error text) per holding whose whole fallback chain failed.
    pub failures: Vec<(String, String)>,
}

impl RefreshReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetches current prices for every active holding and appends one price
/// snapshot per success.
///
/// Fetches are strictly serialized — never parallel — with an inter-request
/// delay, one quote chain per market. A missing USD/TWD rate aborts the
/// whole batch before any snapshot is written when US holdings are present;
/// per-holding chain failures are collected, not fatal.
pub struct RefreshService {
    delay: Duration,
}

impl RefreshService {
    pub fn new() -> Self {
        Self {
            delay: INTER_REQUEST_DELAY,
        }
    }

    /// Override the inter-request delay (tests use a zero delay).
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn refresh_all(
        &self,
        store: &SharedStore,
        tw_chain: &QuoteChain,
        us_chain: &QuoteChain,
        fx: &ExchangeRateProvider,
    ) -> Result<RefreshReport, CoreError> {
        // Snapshot the work list; the store lock is never held across a fetch.
        let targets: Vec<(u64, Market, String)> = {
            let store = store.lock().await;
            store
                .active_holdings()
                .iter()
                .map(|h| (h.id, h.market, h.symbol.clone()))
                .collect()
        };

        // US valuations are impossible without a fresh rate; fail the batch
        // before writing anything rather than produce partial snapshots.
        let needs_fx = targets.iter().any(|(_, market, _)| *market == Market::Us);
        let fx_rate = if needs_fx {
            let quote = fx.usd_twd().await?;
            self.upsert_fx_rate(store, quote.rate, quote.fetched_at).await;
            Some(quote.rate)
        } else {
            None
        };

        let mut report = RefreshReport::default();
        let now = Utc::now();

        for (index, (holding_id, market, symbol)) in targets.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.delay).await;
            }

            let chain = match market {
                Market::Tw => tw_chain,
                Market::Us => us_chain,
            };
            match chain.get_quote(symbol).await {
                Ok(quote) => {
                    let fx_to_twd = match market {
                        Market::Tw => 1.0,
                        // needs_fx guaranteed the rate above.
                        Market::Us => fx_rate.unwrap_or(1.0),
                    };
                    let mut store = store.lock().await;
                    let Some(holding) = store
                        .holdings
                        .iter()
                        .find(|h| h.id == *holding_id && h.meta.is_active())
                    else {
                        // Deleted while the batch was running; drop the quote.
                        continue;
                    };
                    let shares = holding.shares;
                    let captured_at = Utc::now();

                    if holding.company_name.is_empty() {
                        if let Some(name) = quote.name.clone() {
                            if let Some(h) = store.holding_by_id_mut(*holding_id) {
                                h.company_name = name;
                                h.meta.touch(captured_at);
                            }
                        }
                    }

                    let id = store.allocate_id();
                    store.price_snapshots.push(PriceSnapshot {
                        id,
                        holding_id: *holding_id,
                        market: *market,
                        symbol: symbol.clone(),
                        price: quote.price,
                        currency: quote.currency,
                        fx_rate_to_twd: fx_to_twd,
                        value_twd: quote.price * shares * fx_to_twd,
                        captured_at,
                        meta: RecordMeta::new(captured_at),
                    });
                    report.refreshed += 1;
                    debug!(symbol = %symbol, price = quote.price, "price snapshot written");
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "quote chain exhausted");
                    report.failures.push((symbol.clone(), e.to_string()));
                }
            }
        }

        self.write_status(store, &report, now).await;
        Ok(report)
    }

    /// Overwrite the singleton USD_TWD rate row (insert on first use).
    async fn upsert_fx_rate(
        &self,
        store: &SharedStore,
        rate: f64,
        fetched_at: chrono::DateTime<Utc>,
    ) {
        let mut store = store.lock().await;
        match store
            .fx_rates
            .iter_mut()
            .find(|r| r.pair == USD_TWD && r.meta.is_active())
        {
            Some(row) => {
                row.rate = rate;
                row.fetched_at = fetched_at;
                row.source = SOURCE_LABEL.to_string();
                row.meta.touch(fetched_at);
            }
            None => {
                let id = store.allocate_id();
                store.fx_rates.push(FxRate {
                    id,
                    pair: USD_TWD.to_string(),
                    rate,
                    fetched_at,
                    source: SOURCE_LABEL.to_string(),
                    meta: RecordMeta::new(fetched_at),
                });
            }
        }
    }

    /// Record the batch outcome in the "prices" sync-meta row.
    async fn write_status(
        &self,
        store: &SharedStore,
        report: &RefreshReport,
        started_at: chrono::DateTime<Utc>,
    ) {
        let (outcome, message) = if report.is_clean() {
            (RefreshOutcome::Ok, None)
        } else {
            let joined = report
                .failures
                .iter()
                .map(|(symbol, error)| format!("{symbol}: {error}"))
                .collect::<Vec<_>>()
                .join("; ");
            (RefreshOutcome::Error, Some(joined))
        };

        let now = Utc::now();
        let mut store = store.lock().await;
        match store
            .sync_meta
            .iter_mut()
            .find(|m| m.key == PRICES_DOMAIN && m.meta.is_active())
        {
            Some(row) => {
                row.last_refresh_at = Some(started_at);
                row.last_outcome = Some(outcome);
                row.message = message;
                row.meta.touch(now);
            }
            None => {
                let id = store.allocate_id();
                store.sync_meta.push(SyncMeta {
                    id,
                    key: PRICES_DOMAIN.to_string(),
                    last_refresh_at: Some(started_at),
                    last_outcome: Some(outcome),
                    message,
                    meta: RecordMeta::new(now),
                });
            }
        }
    }
}

impl Default for RefreshService {
    fn default() -> Self {
        Self::new()
    }
}
