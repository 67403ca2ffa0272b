//! Instrument domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asset sub-class of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetSubClass {
    Equity,
    Bond,
    Fund,
    Etf,
    Cash,
    Other,
}

impl AssetSubClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Bond => "bond",
            Self::Fund => "fund",
            Self::Etf => "etf",
            Self::Cash => "cash",
            Self::Other => "other",
        }
    }

    /// Best guess from an asset-class hint and the instrument name
    pub fn guess(hint: Option<&str>, name: &str) -> Self {
        if let Some(parsed) = hint.and_then(|h| h.parse().ok()) {
            return parsed;
        }
        let upper = name.to_uppercase();
        let words: Vec<&str> = upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.iter().any(|w| matches!(*w, "ETF" | "UCITS")) {
            Self::Etf
        } else if words
            .iter()
            .any(|w| matches!(*w, "BOND" | "BONDS" | "NOTE" | "NOTES" | "ANLEIHE" | "OBLIGATION"))
            || upper.contains('%')
        {
            Self::Bond
        } else if words.iter().any(|w| matches!(*w, "FUND" | "FONDS" | "SICAV")) {
            Self::Fund
        } else {
            Self::Equity
        }
    }
}

impl fmt::Display for AssetSubClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetSubClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equity" | "equities" | "stock" | "stocks" | "share" | "shares" | "aktien" => {
                Ok(Self::Equity)
            }
            "bond" | "bonds" | "fixed income" | "obligationen" => Ok(Self::Bond),
            "fund" | "funds" | "mutual fund" | "fonds" => Ok(Self::Fund),
            "etf" | "etfs" => Ok(Self::Etf),
            "cash" | "liquidity" | "liquidität" | "money market" => Ok(Self::Cash),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown asset sub-class '{}'", other)),
        }
    }
}

/// A tradable instrument or a per-currency cash placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: Uuid,
    pub name: String,
    pub isin: Option<String>,
    pub ticker: Option<String>,
    pub currency: String,
    pub sub_class: AssetSubClass,
    pub created_at: DateTime<Utc>,
}

impl Instrument {
    pub fn new(name: impl Into<String>, currency: &str, sub_class: AssetSubClass) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            isin: None,
            ticker: None,
            currency: currency.trim().to_uppercase(),
            sub_class,
            created_at: Utc::now(),
        }
    }

    /// The system instrument cash records bind to
    pub fn cash(currency: &str) -> Self {
        Self::new(Self::cash_name(currency), currency, AssetSubClass::Cash)
    }

    pub fn cash_name(currency: &str) -> String {
        format!("Cash {}", currency.trim().to_uppercase())
    }

    pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
        self.isin = Some(isin.into());
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("instrument name cannot be empty");
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err("currency must be a 3-letter ISO code");
        }
        if let Some(isin) = &self.isin {
            if isin.len() != 12 {
                return Err("ISIN must be 12 characters");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_instrument() {
        let cash = Instrument::cash("chf");
        assert_eq!(cash.name, "Cash CHF");
        assert_eq!(cash.currency, "CHF");
        assert_eq!(cash.sub_class, AssetSubClass::Cash);
    }

    #[test]
    fn test_sub_class_guess() {
        assert_eq!(
            AssetSubClass::guess(None, "iShares Core MSCI World UCITS ETF"),
            AssetSubClass::Etf
        );
        assert_eq!(
            AssetSubClass::guess(None, "0.5% Swiss Confederation 2031"),
            AssetSubClass::Bond
        );
        assert_eq!(AssetSubClass::guess(None, "Nestle SA"), AssetSubClass::Equity);
        assert_eq!(
            AssetSubClass::guess(Some("Fonds"), "Anything"),
            AssetSubClass::Fund
        );
        // Unknown hints fall back to the name heuristic
        assert_eq!(
            AssetSubClass::guess(Some("Structured"), "Roche Holding"),
            AssetSubClass::Equity
        );
    }

    #[test]
    fn test_instrument_validation() {
        let instrument = Instrument::new("Apple Inc", "usd", AssetSubClass::Equity)
            .with_isin("US0378331005");
        assert!(instrument.validate().is_ok());

        let instrument = Instrument::new("", "USD", AssetSubClass::Equity);
        assert!(instrument.validate().is_err());
    }
}
