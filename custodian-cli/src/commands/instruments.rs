//! Instruments command - list and create instruments

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, log_command};
use crate::output;
use custodian_core::domain::{AssetSubClass, NewInstrument};

#[derive(Subcommand)]
pub enum InstrumentsCommands {
    /// List instruments
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an instrument
    Add {
        name: String,
        #[arg(long)]
        currency: String,
        #[arg(long)]
        isin: Option<String>,
        #[arg(long)]
        ticker: Option<String>,
        /// equity, bond, fund, etf, cash or other
        #[arg(long = "class", default_value = "equity")]
        sub_class: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: InstrumentsCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        InstrumentsCommands::List { json } => {
            let instruments = ctx.reference_service.list_instruments()?;
            if json {
                return output::json(&instruments);
            }
            let mut table = output::create_table();
            table.set_header(vec!["Name", "ISIN", "Ticker", "Currency", "Class"]);
            for i in &instruments {
                table.add_row(vec![
                    i.name.as_str(),
                    output::or_dash(i.isin.as_deref()),
                    output::or_dash(i.ticker.as_deref()),
                    i.currency.as_str(),
                    i.sub_class.as_str(),
                ]);
            }
            println!("{}", table);
        }
        InstrumentsCommands::Add {
            name,
            currency,
            isin,
            ticker,
            sub_class,
            json,
        } => {
            log_command(&ctx, "instruments add");
            let sub_class: AssetSubClass = sub_class.parse().map_err(anyhow::Error::msg)?;
            let instrument = ctx.reference_service.add_instrument(NewInstrument {
                name,
                isin,
                ticker,
                currency,
                sub_class,
            })?;
            if json {
                return output::json(&instrument);
            }
            output::success(&format!("Added {}", instrument.name));
        }
    }
    Ok(())
}
