use tracing::debug;

use crate::errors::CoreError;
use crate::models::holding::Market;
use crate::models::settings::Settings;

use super::finnhub::FinnhubSource;
use super::tpex::TpexSource;
use super::traits::{Quote, QuoteSource};
use super::twse_daily::TwseDailySource;
use super::twse_monthly::TwseMonthlySource;

/// Ordered fallback chain of quote sources for one market.
///
/// `get_quote` tries sources in registration order and short-circuits on the
/// first usable price. When every source fails, the errors are not discarded:
/// the aggregated failure concatenates each source's error text so a user can
/// see exactly what was tried.
pub struct QuoteChain {
    sources: Vec<Box<dyn QuoteSource>>,
}

impl QuoteChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Build the default chain for a market.
    ///
    /// TW tries the monthly historical table, then the full-market daily
    /// snapshot, then the OTC mainboard snapshot. US uses the real-time
    /// quote endpoint, which needs an API key — without one the chain is
    /// empty and every lookup reports exhaustion.
    pub fn for_market(market: Market, settings: &Settings) -> Self {
        let mut chain = Self::new();
        match market {
            Market::Tw => {
                chain.register(Box::new(TwseMonthlySource::new()));
                chain.register(Box::new(TwseDailySource::new()));
                chain.register(Box::new(TpexSource::new()));
            }
            Market::Us => {
                if let Some(key) = settings.api_keys.get("finnhub") {
                    chain.register(Box::new(FinnhubSource::new(key.clone())));
                }
            }
        }
        chain
    }

    /// Append a source at the lowest priority.
    pub fn register(&mut self, source: Box<dyn QuoteSource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Names of the registered sources, in fallback order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Fetch a quote, falling through the chain until one source returns a
    /// finite, positive price.
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        let mut attempts: Vec<String> = Vec::new();

        for source in &self.sources {
            match source.fetch_quote(symbol).await {
                Ok(quote) if quote.price.is_finite() && quote.price > 0.0 => {
                    return Ok(quote);
                }
                Ok(quote) => {
                    debug!(source = source.name(), symbol, price = quote.price, "unusable price");
                    attempts.push(format!(
                        "{}: unusable price {}",
                        source.name(),
                        quote.price
                    ));
                }
                Err(e) => {
                    debug!(source = source.name(), symbol, error = %e, "quote source failed");
                    attempts.push(format!("{}: {e}", source.name()));
                }
            }
        }

        let attempts = if attempts.is_empty() {
            "no sources configured".to_string()
        } else {
            attempts.join("; ")
        };
        Err(CoreError::ProviderExhausted {
            symbol: symbol.to_string(),
            attempts,
        })
    }
}

impl Default for QuoteChain {
    fn default() -> Self {
        Self::new()
    }
}
