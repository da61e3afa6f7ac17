pub mod chain;
pub mod traits;

// Upstream endpoint implementations
pub mod exchange_rate;
pub mod finnhub;
pub mod tpex;
pub mod twse_daily;
pub mod twse_monthly;

/// Parse a price field as the Taiwanese market endpoints format them.
///
/// `"--"` and empty/whitespace cells mean "no data". Thousands separators
/// are stripped. A value that parses but is non-finite or ≤ 0 is also
/// "no data", never zero.
pub fn parse_price_field(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "--" {
        return None;
    }
    let value: f64 = trimmed.replace(',', "").parse().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}
