//! FX rate source port

use rust_decimal::Decimal;

/// Supplies conversion rates for the value report
pub trait FxRateSource: Send + Sync {
    /// Units of `to` per one unit of `from`, `None` when unknown
    fn rate(&self, from: &str, to: &str) -> Option<Decimal>;
}
