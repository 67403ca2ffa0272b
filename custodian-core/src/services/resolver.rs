//! Reference resolver - binds parsed records to accounts and instruments
//!
//! Lookups are exact. A miss hands a pre-filled proposal to the caller's
//! [`ResolutionPrompt`] and blocks until it decides. Entities the caller saves
//! are staged here, not written: they become visible to later lookups in the
//! same run and are persisted only when the whole import commits.

use crate::domain::result::Error;
use crate::domain::{
    Account, AccountDecision, AccountProposal, AccountType, AssetSubClass, Institution,
    Instrument, InstrumentDecision, InstrumentProposal, NewAccount, NewInstrument,
    ParsedPositionRecord, RecordKind,
};
use crate::ports::{Repository, ResolutionPrompt};
use crate::services::normalizer::{normalize_isin, normalize_ticker};

/// Why a record did not resolve
#[derive(Debug)]
pub enum ResolutionOutcome {
    /// Instrument prompt answered Ignore; counted as a duplicate row
    Ignored,
    /// Account prompt answered Cancel; counted as a failed row
    Cancelled,
    /// A saved entity was invalid or still did not match
    Unresolved(String),
    /// Stop the whole import
    Aborted,
    Repository(Error),
}

impl From<Error> for ResolutionOutcome {
    fn from(err: Error) -> Self {
        Self::Repository(err)
    }
}

/// Result of one exact lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// More than one candidate; never guessed
    Ambiguous(usize),
}

impl<T> Lookup<T> {
    fn from_candidates(mut candidates: Vec<T>) -> Self {
        match candidates.len() {
            0 => Self::NotFound,
            1 => Self::Found(candidates.remove(0)),
            n => Self::Ambiguous(n),
        }
    }
}

/// Entities created during this run, not yet in the store
#[derive(Debug, Clone, Default)]
pub struct StagedEntities {
    pub accounts: Vec<Account>,
    pub instruments: Vec<Instrument>,
}

impl StagedEntities {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.instruments.is_empty()
    }
}

/// What the cascade matches an instrument on
struct InstrumentKey<'r> {
    isin: Option<&'r str>,
    ticker: Option<&'r str>,
    name: &'r str,
    currency: &'r str,
}

impl<'r> InstrumentKey<'r> {
    fn of(record: &'r ParsedPositionRecord, cash_name: &'r str) -> Self {
        match record.kind {
            RecordKind::Cash => Self {
                isin: None,
                ticker: None,
                name: cash_name,
                currency: &record.currency,
            },
            RecordKind::Security => Self {
                isin: record.isin.as_deref(),
                ticker: record.ticker.as_deref(),
                name: &record.instrument_name,
                currency: &record.currency,
            },
        }
    }

    /// A candidate carrying a different ISIN is a different security
    fn conflicts(&self, candidate: &Instrument) -> bool {
        matches!((self.isin, candidate.isin.as_deref()), (Some(a), Some(b)) if a != b)
    }
}

pub struct ReferenceResolver<'a> {
    repository: &'a dyn Repository,
    institution: &'a Institution,
    staged: StagedEntities,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(repository: &'a dyn Repository, institution: &'a Institution) -> Self {
        Self {
            repository,
            institution,
            staged: StagedEntities::default(),
        }
    }

    pub fn staged(&self) -> &StagedEntities {
        &self.staged
    }

    pub fn into_staged(self) -> StagedEntities {
        self.staged
    }

    /// Resolve the account first, then the instrument. The instrument is
    /// never prompted for when the account did not resolve.
    pub fn resolve(
        &mut self,
        record: &ParsedPositionRecord,
        prompt: &mut dyn ResolutionPrompt,
    ) -> Result<(Account, Instrument), ResolutionOutcome> {
        let account = self.resolve_account(record, prompt)?;
        let instrument = self.resolve_instrument(record, prompt)?;
        Ok((account, instrument))
    }

    // === Accounts ===

    pub fn lookup_account(&self, account_number: &str) -> Result<Lookup<Account>, Error> {
        let number = Account::normalize_number(account_number);
        let mut candidates = self.repository.find_accounts(self.institution.id, &number)?;
        candidates.extend(
            self.staged
                .accounts
                .iter()
                .filter(|a| a.account_number == number)
                .cloned(),
        );
        Ok(Lookup::from_candidates(candidates))
    }

    fn resolve_account(
        &mut self,
        record: &ParsedPositionRecord,
        prompt: &mut dyn ResolutionPrompt,
    ) -> Result<Account, ResolutionOutcome> {
        match self.lookup_account(&record.account_number)? {
            Lookup::Found(account) => return Ok(account),
            Lookup::Ambiguous(n) => {
                tracing::debug!(candidates = n, "ambiguous account match, asking caller");
            }
            Lookup::NotFound => {}
        }

        let proposal = self.account_proposal(record);
        tracing::debug!(line = record.source.line, "prompting for unknown account");
        match prompt.unknown_account(&proposal) {
            AccountDecision::Save(new) => {
                self.stage_account(new)?;
                match self.lookup_account(&record.account_number)? {
                    Lookup::Found(account) => Ok(account),
                    _ => {
                        // A failed row leaves nothing behind for the commit
                        self.staged.accounts.pop();
                        Err(ResolutionOutcome::Unresolved(format!(
                            "account {} still not found after saving",
                            record.account_number
                        )))
                    }
                }
            }
            AccountDecision::Cancel => Err(ResolutionOutcome::Cancelled),
            AccountDecision::Abort => Err(ResolutionOutcome::Aborted),
        }
    }

    fn account_proposal(&self, record: &ParsedPositionRecord) -> AccountProposal {
        AccountProposal {
            institution_id: self.institution.id,
            institution_code: self.institution.code.clone(),
            account_number: Account::normalize_number(&record.account_number),
            account_name: record.account_name.clone(),
            currency: record.currency.clone(),
            account_type: match record.kind {
                RecordKind::Cash => AccountType::Cash,
                RecordKind::Security => AccountType::Custody,
            },
            source: record.source.clone(),
        }
    }

    fn stage_account(&mut self, new: NewAccount) -> Result<(), ResolutionOutcome> {
        let account = Account::new(
            self.institution.id,
            &new.account_number,
            new.name,
            &new.currency,
            new.account_type,
        );
        account
            .validate()
            .map_err(|e| ResolutionOutcome::Unresolved(format!("invalid account: {}", e)))?;
        if !matches!(self.lookup_account(&account.account_number)?, Lookup::NotFound) {
            return Err(ResolutionOutcome::Unresolved(format!(
                "account {} already exists",
                account.account_number
            )));
        }
        tracing::debug!(institution = %self.institution.code, "account staged");
        self.staged.accounts.push(account);
        Ok(())
    }

    // === Instruments ===

    /// ISIN, then ticker, then name + currency. An ambiguous step ends the
    /// cascade as not found.
    pub fn lookup_instrument(
        &self,
        record: &ParsedPositionRecord,
    ) -> Result<Lookup<Instrument>, Error> {
        let cash_name = Instrument::cash_name(&record.currency);
        let key = InstrumentKey::of(record, &cash_name);

        if let Some(isin) = key.isin {
            let mut candidates = self.repository.find_instruments_by_isin(isin)?;
            candidates.extend(self.staged_instruments(|i| i.isin.as_deref() == Some(isin)));
            // Several listings of one ISIN: the record's currency picks the line
            if candidates.len() > 1 {
                candidates.retain(|i| i.currency == key.currency);
            }
            match Lookup::from_candidates(candidates) {
                Lookup::NotFound => {}
                other => return Ok(other),
            }
        }

        if let Some(ticker) = key.ticker {
            let mut candidates = self.repository.find_instruments_by_ticker(ticker)?;
            candidates.extend(self.staged_instruments(|i| {
                i.ticker
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case(ticker))
            }));
            candidates.retain(|i| !key.conflicts(i));
            match Lookup::from_candidates(candidates) {
                Lookup::NotFound => {}
                other => return Ok(other),
            }
        }

        let name = key.name.trim();
        let mut candidates = self.repository.find_instruments_by_name(name, key.currency)?;
        candidates.extend(self.staged_instruments(|i| {
            i.currency == key.currency && i.name.trim().eq_ignore_ascii_case(name)
        }));
        candidates.retain(|i| !key.conflicts(i));
        Ok(Lookup::from_candidates(candidates))
    }

    fn staged_instruments(&self, predicate: impl Fn(&Instrument) -> bool) -> Vec<Instrument> {
        self.staged
            .instruments
            .iter()
            .filter(|i| predicate(i))
            .cloned()
            .collect()
    }

    fn resolve_instrument(
        &mut self,
        record: &ParsedPositionRecord,
        prompt: &mut dyn ResolutionPrompt,
    ) -> Result<Instrument, ResolutionOutcome> {
        match self.lookup_instrument(record)? {
            Lookup::Found(instrument) => return Ok(instrument),
            Lookup::Ambiguous(n) => {
                tracing::debug!(candidates = n, "ambiguous instrument match, asking caller");
            }
            Lookup::NotFound => {}
        }

        // Cash lines bind to the per-currency cash instrument without asking
        if record.kind == RecordKind::Cash {
            let cash = Instrument::cash(&record.currency);
            self.staged.instruments.push(cash.clone());
            return Ok(cash);
        }

        let proposal = instrument_proposal(record);
        tracing::debug!(line = record.source.line, "prompting for unknown instrument");
        match prompt.unknown_instrument(&proposal) {
            InstrumentDecision::Save(new) => {
                self.stage_instrument(new)?;
                match self.lookup_instrument(record)? {
                    Lookup::Found(instrument) => Ok(instrument),
                    _ => {
                        self.staged.instruments.pop();
                        Err(ResolutionOutcome::Unresolved(format!(
                            "instrument '{}' still not found after saving",
                            record.instrument_name
                        )))
                    }
                }
            }
            InstrumentDecision::Ignore => Err(ResolutionOutcome::Ignored),
            InstrumentDecision::Abort => Err(ResolutionOutcome::Aborted),
        }
    }

    fn stage_instrument(&mut self, new: NewInstrument) -> Result<(), ResolutionOutcome> {
        let mut instrument = Instrument::new(new.name.trim(), &new.currency, new.sub_class);
        if let Some(raw) = new.isin.as_deref().filter(|s| !s.trim().is_empty()) {
            let isin = normalize_isin(raw).map_err(|e| {
                ResolutionOutcome::Unresolved(format!("invalid instrument ISIN '{}': {}", raw, e))
            })?;
            instrument = instrument.with_isin(isin);
        }
        if let Some(ticker) = new.ticker.as_deref().and_then(normalize_ticker) {
            instrument = instrument.with_ticker(ticker);
        }
        instrument
            .validate()
            .map_err(|e| ResolutionOutcome::Unresolved(format!("invalid instrument: {}", e)))?;
        tracing::debug!(sub_class = %instrument.sub_class, "instrument staged");
        self.staged.instruments.push(instrument);
        Ok(())
    }
}

fn instrument_proposal(record: &ParsedPositionRecord) -> InstrumentProposal {
    InstrumentProposal {
        name: record.instrument_name.clone(),
        isin: record.isin.clone(),
        ticker: record.ticker.clone(),
        currency: record.currency.clone(),
        sub_class: AssetSubClass::guess(record.asset_class.as_deref(), &record.instrument_name),
        account_number: record.account_number.clone(),
        source: record.source.clone(),
    }
}
