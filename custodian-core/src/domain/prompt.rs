//! Resolution prompt payloads and decisions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountType;
use super::instrument::AssetSubClass;
use super::record::SourceRef;

/// Pre-filled account creation offered to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProposal {
    pub institution_id: Uuid,
    pub institution_code: String,
    pub account_number: String,
    pub account_name: String,
    pub currency: String,
    pub account_type: AccountType,
    pub source: SourceRef,
}

impl AccountProposal {
    /// Accept the proposal unchanged
    pub fn accept(&self) -> NewAccount {
        NewAccount {
            account_number: self.account_number.clone(),
            name: self.account_name.clone(),
            currency: self.currency.clone(),
            account_type: self.account_type,
        }
    }
}

/// Pre-filled instrument creation offered to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentProposal {
    pub name: String,
    pub isin: Option<String>,
    pub ticker: Option<String>,
    pub currency: String,
    pub sub_class: AssetSubClass,
    /// Account the row belongs to, for context
    pub account_number: String,
    pub source: SourceRef,
}

impl InstrumentProposal {
    /// Accept the proposal unchanged
    pub fn accept(&self) -> NewInstrument {
        NewInstrument {
            name: self.name.clone(),
            isin: self.isin.clone(),
            ticker: self.ticker.clone(),
            currency: self.currency.clone(),
            sub_class: self.sub_class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub account_number: String,
    pub name: String,
    pub currency: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstrument {
    pub name: String,
    pub isin: Option<String>,
    pub ticker: Option<String>,
    pub currency: String,
    pub sub_class: AssetSubClass,
}

/// Answer to an unknown-account prompt. Accounts cannot be ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountDecision {
    Save(NewAccount),
    /// Skip this row, keep importing
    Cancel,
    /// Stop the whole import
    Abort,
}

/// Answer to an unknown-instrument prompt. Instruments cannot be cancelled.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentDecision {
    Save(NewInstrument),
    /// Treat the row as a duplicate and skip it
    Ignore,
    /// Stop the whole import
    Abort,
}

/// A question the pipeline is blocked on
#[derive(Debug, Clone, PartialEq)]
pub enum PromptRequest {
    UnknownAccount(AccountProposal),
    UnknownInstrument(InstrumentProposal),
}

impl PromptRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAccount(_) => "account",
            Self::UnknownInstrument(_) => "instrument",
        }
    }

    /// Short human label for the missing entity
    pub fn subject(&self) -> String {
        match self {
            Self::UnknownAccount(p) => format!("account {}", p.account_number),
            Self::UnknownInstrument(p) => match (&p.isin, &p.ticker) {
                (Some(isin), _) => format!("instrument {} ({})", p.name, isin),
                (None, Some(ticker)) => format!("instrument {} ({})", p.name, ticker),
                (None, None) => format!("instrument {} [{}]", p.name, p.currency),
            },
        }
    }
}

/// Reply carried back to a blocked pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PromptDecision {
    Account(AccountDecision),
    Instrument(InstrumentDecision),
}
