//! Configuration management
//!
//! Settings live in `<data_dir>/settings.json`:
//! ```json
//! {
//!   "app": { "baseCurrency": "CHF" },
//!   "fxRates": { "USD": "0.8812", "EUR": "0.9410" },
//!   "parserProfiles": {
//!     "zkb_csv": { "delimiter": ";", "numberFormat": "1'234.56", "dateFormat": "%d.%m.%Y" }
//!   },
//!   "institutionFormats": { "ZKB": "zkb_csv" }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{fields, NumberFormat};

pub const DEFAULT_BASE_CURRENCY: &str = "CHF";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    fx_rates: HashMap<String, String>,
    #[serde(default)]
    parser_profiles: HashMap<String, ParserProfile>,
    #[serde(default)]
    institution_formats: HashMap<String, String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_currency: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Custodian configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    pub base_currency: String,
    /// Units of base currency per unit of the keyed currency
    pub fx_rates: HashMap<String, Decimal>,
    pub parser_profiles: HashMap<String, ParserProfile>,
    /// Institution code -> parser tag
    pub institution_formats: HashMap<String, String>,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            fx_rates: HashMap::new(),
            parser_profiles: HashMap::new(),
            institution_formats: HashMap::new(),
            _raw_settings: SettingsFile::default(),
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// The base currency can be overridden with CUSTODIAN_BASE_CURRENCY.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let base_currency = std::env::var("CUSTODIAN_BASE_CURRENCY")
            .ok()
            .or_else(|| raw.app.base_currency.clone())
            .map(|c| c.trim().to_uppercase())
            .filter(|c| c.len() == 3)
            .unwrap_or_else(|| DEFAULT_BASE_CURRENCY.to_string());

        let mut fx_rates = HashMap::new();
        for (currency, rate) in &raw.fx_rates {
            match Decimal::from_str(rate.trim()) {
                Ok(rate) if rate > Decimal::ZERO => {
                    fx_rates.insert(currency.trim().to_uppercase(), rate);
                }
                _ => tracing::warn!(currency = %currency, rate = %rate, "ignoring invalid fx rate"),
            }
        }

        let institution_formats = raw
            .institution_formats
            .iter()
            .map(|(code, format)| (code.trim().to_uppercase(), format.clone()))
            .collect();

        Ok(Self {
            base_currency,
            fx_rates,
            parser_profiles: raw.parser_profiles.clone(),
            institution_formats,
            _raw_settings: raw,
        })
    }

    /// Save config to the data directory
    /// Preserves other settings that this tool doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");

        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            self._raw_settings.clone()
        };

        settings.app.base_currency = Some(self.base_currency.clone());
        settings.fx_rates = self
            .fx_rates
            .iter()
            .map(|(c, r)| (c.clone(), r.to_string()))
            .collect();
        settings.parser_profiles = self.parser_profiles.clone();
        settings.institution_formats = self.institution_formats.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

/// A named generic-CSV layout registered as its own parser tag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserProfile {
    #[serde(default)]
    pub description: Option<String>,
    /// Auto-detected when absent
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub number_format: NumberFormat,
    #[serde(default)]
    pub date_format: Option<String>,
    /// Lines to drop before looking for the header
    #[serde(default)]
    pub skip_rows: usize,
    #[serde(default)]
    pub allow_short_positions: bool,
    #[serde(default)]
    pub column_mappings: ColumnMappings,
}

/// Explicit header names per canonical field; unset fields fall back to alias matching
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMappings {
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub as_of_date: Option<String>,
    #[serde(default)]
    pub asset_class: Option<String>,
}

impl ColumnMappings {
    /// (canonical field, header name) for every mapping that is set
    pub fn explicit(&self) -> Vec<(&'static str, &str)> {
        [
            (fields::ACCOUNT_NUMBER, &self.account_number),
            (fields::ACCOUNT_NAME, &self.account_name),
            (fields::INSTRUMENT, &self.instrument),
            (fields::TICKER, &self.ticker),
            (fields::ISIN, &self.isin),
            (fields::CURRENCY, &self.currency),
            (fields::QUANTITY, &self.quantity),
            (fields::PRICE, &self.price),
            (fields::AS_OF_DATE, &self.as_of_date),
            (fields::ASSET_CLASS, &self.asset_class),
        ]
        .into_iter()
        .filter_map(|(field, name)| name.as_deref().map(|n| (field, n)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.base_currency, "CHF");
        assert!(config.fx_rates.is_empty());
        assert!(config.parser_profiles.is_empty());
    }

    #[test]
    fn test_load_profiles_and_rates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{
                "app": { "baseCurrency": "chf", "theme": "dark" },
                "fxRates": { "usd": "0.88", "EUR": "bogus" },
                "parserProfiles": {
                    "zkb_csv": {
                        "delimiter": ";",
                        "numberFormat": "1'234.56",
                        "dateFormat": "%d.%m.%Y",
                        "columnMappings": { "quantity": "Nominal/Stück" }
                    }
                },
                "institutionFormats": { "zkb": "zkb_csv" },
                "unrelated": [1, 2, 3]
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.fx_rates.get("USD"), Some(&Decimal::new(88, 2)));
        assert!(!config.fx_rates.contains_key("EUR"));
        let profile = &config.parser_profiles["zkb_csv"];
        assert_eq!(profile.delimiter, Some(';'));
        assert_eq!(profile.number_format, NumberFormat::SWISS);
        assert_eq!(
            profile.column_mappings.explicit(),
            vec![(fields::QUANTITY, "Nominal/Stück")]
        );
        assert_eq!(config.institution_formats["ZKB"], "zkb_csv");
    }

    #[test]
    fn test_save_preserves_unmanaged_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "app": { "theme": "dark" }, "unrelated": true }"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        config.fx_rates.insert("USD".to_string(), Decimal::new(9, 1));
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["unrelated"], true);
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["fxRates"]["USD"], "0.9");
    }
}
