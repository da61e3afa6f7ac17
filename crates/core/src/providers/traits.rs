use async_trait::async_trait;

use crate::errors::CoreError;

/// A single fetched market quote.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Last/closing price in the source's native currency. Always finite
    /// and positive once it leaves the chain.
    pub price: f64,

    /// Currency the price is denominated in ("TWD" or "USD").
    pub currency: String,

    /// Company name, when the endpoint happens to carry one.
    pub name: Option<String>,
}

/// The one capability every quote upstream exposes.
///
/// Each endpoint (Finnhub, TWSE monthly, TWSE daily snapshot, TPEx OTC)
/// implements this trait; the `QuoteChain` iterates over an ordered list of
/// them and short-circuits on the first usable answer. Swapping a broken
/// endpoint touches exactly one implementation.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source (for logs/aggregated errors).
    fn name(&self) -> &str;

    /// Fetch the current quote for a symbol.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError>;
}
