//! Terminal resolution prompts and the import spinner

use std::time::Duration;

use colored::Colorize;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};

use custodian_core::domain::{
    AccountDecision, AccountProposal, AssetSubClass, InstrumentDecision, InstrumentProposal,
    NewAccount, NewInstrument,
};
use custodian_core::{
    ImportError, PositionImportSummary, ProgressEvent, ProgressReporter, ResolutionPrompt,
};

/// Asks about unknown accounts and instruments with dialoguer
///
/// The spinner is suspended while a question is on screen. Any terminal
/// error answers Abort, so nothing half-resolved is saved.
pub struct TerminalPrompt {
    spinner: ProgressBar,
}

impl TerminalPrompt {
    pub fn new(spinner: ProgressBar) -> Self {
        Self { spinner }
    }
}

const SAVE: usize = 0;
const EDIT: usize = 1;
const SKIP: usize = 2;

impl ResolutionPrompt for TerminalPrompt {
    fn unknown_account(&mut self, proposal: &AccountProposal) -> AccountDecision {
        self.spinner.suspend(|| {
            println!();
            println!(
                "{} {} at {} ({})",
                "Unknown account".yellow().bold(),
                proposal.account_number,
                proposal.institution_code,
                proposal.source
            );
            match ask_account(proposal) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(error = %e, "prompt failed, aborting import");
                    AccountDecision::Abort
                }
            }
        })
    }

    fn unknown_instrument(&mut self, proposal: &InstrumentProposal) -> InstrumentDecision {
        self.spinner.suspend(|| {
            println!();
            println!(
                "{} {} [{}] in account {} ({})",
                "Unknown instrument".yellow().bold(),
                proposal.name,
                proposal.isin.as_deref().unwrap_or("no ISIN"),
                proposal.account_number,
                proposal.source
            );
            match ask_instrument(proposal) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(error = %e, "prompt failed, aborting import");
                    InstrumentDecision::Abort
                }
            }
        })
    }
}

fn ask_account(proposal: &AccountProposal) -> dialoguer::Result<AccountDecision> {
    let choice = Select::new()
        .with_prompt("Create it?")
        .items(&[
            "Save as proposed",
            "Edit, then save",
            "Skip this row",
            "Abort the import",
        ])
        .default(SAVE)
        .interact()?;

    Ok(match choice {
        SAVE => AccountDecision::Save(proposal.accept()),
        EDIT => {
            let name: String = Input::new()
                .with_prompt("Account name")
                .with_initial_text(&proposal.account_name)
                .interact_text()?;
            let currency: String = Input::new()
                .with_prompt("Currency")
                .with_initial_text(&proposal.currency)
                .interact_text()?;
            let account_type: String = Input::new()
                .with_prompt("Type (custody/cash)")
                .with_initial_text(proposal.account_type.as_str())
                .interact_text()?;
            AccountDecision::Save(NewAccount {
                account_number: proposal.account_number.clone(),
                name,
                currency,
                account_type: account_type.parse().unwrap_or(proposal.account_type),
            })
        }
        SKIP => AccountDecision::Cancel,
        _ => AccountDecision::Abort,
    })
}

fn ask_instrument(proposal: &InstrumentProposal) -> dialoguer::Result<InstrumentDecision> {
    let choice = Select::new()
        .with_prompt("Create it?")
        .items(&[
            "Save as proposed",
            "Edit, then save",
            "Ignore this row",
            "Abort the import",
        ])
        .default(SAVE)
        .interact()?;

    Ok(match choice {
        SAVE => InstrumentDecision::Save(proposal.accept()),
        EDIT => {
            let name: String = Input::new()
                .with_prompt("Name")
                .with_initial_text(&proposal.name)
                .interact_text()?;
            let ticker: String = Input::new()
                .with_prompt("Ticker (empty for none)")
                .with_initial_text(proposal.ticker.as_deref().unwrap_or(""))
                .allow_empty(true)
                .interact_text()?;
            let sub_class: String = Input::new()
                .with_prompt("Class (equity/bond/fund/etf/cash/other)")
                .with_initial_text(proposal.sub_class.as_str())
                .interact_text()?;
            InstrumentDecision::Save(NewInstrument {
                name,
                isin: proposal.isin.clone(),
                ticker: Some(ticker).filter(|t| !t.trim().is_empty()),
                currency: proposal.currency.clone(),
                sub_class: sub_class
                    .parse::<AssetSubClass>()
                    .unwrap_or(proposal.sub_class),
            })
        }
        SKIP => InstrumentDecision::Ignore,
        _ => InstrumentDecision::Abort,
    })
}

/// Shows progress events as spinner messages
pub struct SpinnerReporter {
    spinner: ProgressBar,
}

impl SpinnerReporter {
    /// A hidden spinner when `visible` is false, e.g. for `--json`
    pub fn new(visible: bool) -> Self {
        let spinner = if visible {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        } else {
            ProgressBar::hidden()
        };
        Self { spinner }
    }

    pub fn spinner(&self) -> ProgressBar {
        self.spinner.clone()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn on_progress(&self, event: &ProgressEvent) {
        self.spinner.set_message(event.to_string());
    }

    fn on_result(&self, _result: &Result<PositionImportSummary, ImportError>) {
        self.spinner.finish_and_clear();
    }
}
