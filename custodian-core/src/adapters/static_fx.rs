//! FX rates from settings
//!
//! Rates are quoted against the base currency: `USD = 0.88` means one USD is
//! worth 0.88 units of base. Cross rates go through the base.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::config::Config;
use crate::ports::FxRateSource;

#[derive(Debug, Clone)]
pub struct StaticFxRates {
    base: String,
    rates: HashMap<String, Decimal>,
}

impl StaticFxRates {
    pub fn new(base: impl Into<String>, rates: HashMap<String, Decimal>) -> Self {
        Self {
            base: base.into(),
            rates,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.base_currency.clone(), config.fx_rates.clone())
    }

    /// Units of base per unit of `currency`
    fn to_base(&self, currency: &str) -> Option<Decimal> {
        if currency == self.base {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied().filter(|r| !r.is_zero())
    }
}

impl FxRateSource for StaticFxRates {
    fn rate(&self, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        let from_base = self.to_base(from)?;
        let to_base = self.to_base(to)?;
        from_base.checked_div(to_base)
    }
}
