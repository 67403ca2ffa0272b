//! Fx command - static rates used by the value report

use std::str::FromStr;

use anyhow::{bail, Result};
use clap::Subcommand;
use rust_decimal::Decimal;

use super::get_data_dir;
use crate::output::{self, format_decimal};
use custodian_core::config::Config;

#[derive(Subcommand)]
pub enum FxCommands {
    /// Show the configured rates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set units of base currency per unit of CURRENCY
    Set { currency: String, rate: String },
}

pub fn run(command: FxCommands) -> Result<()> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    let mut config = Config::load(&data_dir)?;

    match command {
        FxCommands::List { json } => {
            let mut rates: Vec<_> = config.fx_rates.iter().collect();
            rates.sort();
            if json {
                let rates: std::collections::BTreeMap<_, _> =
                    rates.into_iter().map(|(c, r)| (c, r.to_string())).collect();
                return output::json(&serde_json::json!({
                    "baseCurrency": config.base_currency,
                    "rates": rates,
                }));
            }
            println!("Base currency: {}", config.base_currency);
            let mut table = output::create_table();
            table.set_header(vec!["Currency".to_string(), format!("{} per unit", config.base_currency)]);
            for (currency, rate) in rates {
                table.add_row(vec![currency.clone(), format_decimal(*rate)]);
            }
            println!("{}", table);
        }
        FxCommands::Set { currency, rate } => {
            let currency = currency.trim().to_uppercase();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                bail!("'{}' is not a 3-letter currency code", currency);
            }
            let rate = Decimal::from_str(rate.trim())
                .ok()
                .filter(|r| *r > Decimal::ZERO)
                .ok_or_else(|| anyhow::anyhow!("rate must be a positive number"))?;
            config.fx_rates.insert(currency.clone(), rate);
            config.save(&data_dir)?;
            output::success(&format!(
                "1 {} = {} {}",
                currency,
                format_decimal(rate),
                config.base_currency
            ));
        }
    }
    Ok(())
}
