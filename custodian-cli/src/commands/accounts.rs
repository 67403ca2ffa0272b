//! Accounts command - list and create accounts

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, log_command, parse_account_type};
use crate::output;
use custodian_core::domain::NewAccount;
use custodian_core::AccountType;

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// List accounts
    List {
        /// Only this institution
        #[arg(long)]
        institution: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an account
    Add {
        /// Institution code
        institution: String,
        /// Account number as it appears on statements
        number: String,
        /// Display name (defaults to the number)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "CHF")]
        currency: String,
        /// custody or cash
        #[arg(long = "type", default_value = "custody")]
        account_type: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountsCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        AccountsCommands::List { institution, json } => {
            let accounts = ctx.reference_service.list_accounts(institution.as_deref())?;
            if json {
                return output::json(&accounts);
            }
            if accounts.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["Number", "Name", "Currency", "Type"]);
            for a in &accounts {
                table.add_row(vec![
                    a.account_number.as_str(),
                    a.name.as_str(),
                    a.currency.as_str(),
                    a.account_type.as_str(),
                ]);
            }
            println!("{}", table);
        }
        AccountsCommands::Add {
            institution,
            number,
            name,
            currency,
            account_type,
            json,
        } => {
            log_command(&ctx, "accounts add");
            let account_type =
                parse_account_type(Some(&account_type))?.unwrap_or(AccountType::Custody);
            let account = ctx.reference_service.add_account(
                &institution,
                NewAccount {
                    name: name.unwrap_or_else(|| number.clone()),
                    account_number: number,
                    currency,
                    account_type,
                },
            )?;
            if json {
                return output::json(&account);
            }
            output::success(&format!("Added account {}", account.account_number));
        }
    }
    Ok(())
}
