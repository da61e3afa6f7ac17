// ═══════════════════════════════════════════════════════════════════
// Provider Tests — price-field parsing, fallback chain semantics
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use twfolio_core::errors::CoreError;
use twfolio_core::models::holding::Market;
use twfolio_core::models::settings::Settings;
use twfolio_core::providers::chain::QuoteChain;
use twfolio_core::providers::parse_price_field;
use twfolio_core::providers::traits::{Quote, QuoteSource};

// ═══════════════════════════════════════════════════════════════════
// Mock Source
// ═══════════════════════════════════════════════════════════════════

#[derive(Clone)]
struct MockSource {
    name: &'static str,
    /// `Some(price)` answers, `None` errors.
    price: Option<f64>,
    calls: Arc<AtomicUsize>,
}

impl MockSource {
    fn answering(name: &'static str, price: f64) -> Self {
        Self {
            name,
            price: Some(price),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            name,
            price: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.price {
            Some(price) => Ok(Quote {
                price,
                currency: "TWD".into(),
                name: None,
            }),
            None => Err(CoreError::Provider {
                provider: self.name.into(),
                message: format!("no data for {symbol}"),
            }),
        }
    }
}

// ── Price-field parsing ─────────────────────────────────────────────

#[test]
fn parses_thousands_separated_prices() {
    assert_eq!(parse_price_field("1,234.50"), Some(1234.5));
    assert_eq!(parse_price_field("593.00"), Some(593.0));
    assert_eq!(parse_price_field(" 42 "), Some(42.0));
}

#[test]
fn placeholder_and_empty_mean_no_data() {
    assert_eq!(parse_price_field("--"), None);
    assert_eq!(parse_price_field(""), None);
    assert_eq!(parse_price_field("   "), None);
}

#[test]
fn non_positive_and_garbage_mean_no_data() {
    assert_eq!(parse_price_field("0"), None);
    assert_eq!(parse_price_field("0.00"), None);
    assert_eq!(parse_price_field("-5.2"), None);
    assert_eq!(parse_price_field("abc"), None);
    assert_eq!(parse_price_field("NaN"), None);
    assert_eq!(parse_price_field("inf"), None);
}

// ── Chain fallback ──────────────────────────────────────────────────

#[tokio::test]
async fn first_success_short_circuits() {
    let first = MockSource::answering("first", 600.0);
    let second = MockSource::answering("second", 999.0);

    let mut chain = QuoteChain::new();
    chain.register(Box::new(first.clone()));
    chain.register(Box::new(second.clone()));

    let quote = chain.get_quote("2330").await.unwrap();
    assert_eq!(quote.price, 600.0);
    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 0);
}

#[tokio::test]
async fn falls_through_failures_to_next_source() {
    let broken = MockSource::failing("broken");
    let healthy = MockSource::answering("healthy", 123.0);

    let mut chain = QuoteChain::new();
    chain.register(Box::new(broken.clone()));
    chain.register(Box::new(healthy.clone()));

    let quote = chain.get_quote("2330").await.unwrap();
    assert_eq!(quote.price, 123.0);
    assert_eq!(broken.call_count(), 1);
    assert_eq!(healthy.call_count(), 1);
}

#[tokio::test]
async fn zero_price_counts_as_failure() {
    let bogus = MockSource::answering("bogus", 0.0);
    let healthy = MockSource::answering("healthy", 55.5);

    let mut chain = QuoteChain::new();
    chain.register(Box::new(bogus));
    chain.register(Box::new(healthy));

    let quote = chain.get_quote("2330").await.unwrap();
    assert_eq!(quote.price, 55.5);
}

#[tokio::test]
async fn exhausted_chain_aggregates_every_error_in_order() {
    let mut chain = QuoteChain::new();
    chain.register(Box::new(MockSource::failing("alpha")));
    chain.register(Box::new(MockSource::failing("beta")));

    let err = chain.get_quote("2330").await.unwrap_err();
    match err {
        CoreError::ProviderExhausted { symbol, attempts } => {
            assert_eq!(symbol, "2330");
            let alpha = attempts.find("alpha").expect("alpha attempt recorded");
            let beta = attempts.find("beta").expect("beta attempt recorded");
            assert!(alpha < beta, "errors must keep chain order: {attempts}");
            assert!(attempts.contains("no data for 2330"));
        }
        other => panic!("expected ProviderExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_chain_reports_no_sources() {
    let chain = QuoteChain::new();
    let err = chain.get_quote("2330").await.unwrap_err();
    match err {
        CoreError::ProviderExhausted { attempts, .. } => {
            assert_eq!(attempts, "no sources configured");
        }
        other => panic!("expected ProviderExhausted, got {other:?}"),
    }
}

// ── Default chain composition ───────────────────────────────────────

#[test]
fn tw_chain_orders_monthly_then_daily_then_otc() {
    let chain = QuoteChain::for_market(Market::Tw, &Settings::default());
    assert_eq!(
        chain.source_names(),
        vec!["TWSE monthly", "TWSE daily snapshot", "TPEx"]
    );
}

#[test]
fn us_chain_is_empty_without_api_key() {
    let chain = QuoteChain::for_market(Market::Us, &Settings::default());
    assert!(chain.is_empty());
}

#[test]
fn us_chain_uses_finnhub_when_keyed() {
    let mut settings = Settings::default();
    settings.api_keys.insert("finnhub".into(), "k".into());
    let chain = QuoteChain::for_market(Market::Us, &settings);
    assert_eq!(chain.source_names(), vec!["Finnhub"]);
}
