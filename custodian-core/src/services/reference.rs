//! Reference service - institutions, accounts and instruments for the caller

use std::sync::Arc;

use crate::adapters::parsers::ParserRegistry;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountType, ImportSession, Institution, Instrument, NewAccount, NewInstrument,
    PositionView,
};
use crate::ports::Repository;
use crate::services::normalizer::{normalize_isin, normalize_ticker};

pub struct ReferenceService {
    repository: Arc<dyn Repository>,
    parsers: Arc<ParserRegistry>,
}

impl ReferenceService {
    pub fn new(repository: Arc<dyn Repository>, parsers: Arc<ParserRegistry>) -> Self {
        Self {
            repository,
            parsers,
        }
    }

    // === Institutions ===

    pub fn fetch_institutions(&self) -> Result<Vec<Institution>> {
        self.repository.get_institutions()
    }

    pub fn get_institution(&self, code: &str) -> Result<Institution> {
        let code = Institution::normalize_code(code);
        self.repository
            .get_institution_by_code(&code)?
            .ok_or_else(|| Error::not_found(format!("institution {}", code)))
    }

    pub fn add_institution(
        &self,
        code: &str,
        name: &str,
        default_format: Option<&str>,
    ) -> Result<Institution> {
        let mut institution = Institution::new(code, name.trim());
        if let Some(format) = default_format {
            self.parsers
                .get(format)
                .map_err(|e| Error::validation(e.message))?;
            institution = institution.with_default_format(format);
        }
        institution.validate().map_err(Error::validation)?;
        if self
            .repository
            .get_institution_by_code(&institution.code)?
            .is_some()
        {
            return Err(Error::validation(format!(
                "institution {} already exists",
                institution.code
            )));
        }
        self.repository.add_institution(&institution)?;
        tracing::info!(code = %institution.code, "institution added");
        Ok(institution)
    }

    // === Accounts ===

    pub fn list_accounts(&self, institution_code: Option<&str>) -> Result<Vec<Account>> {
        let institution_id = match institution_code {
            Some(code) => Some(self.get_institution(code)?.id),
            None => None,
        };
        self.repository.get_accounts(institution_id)
    }

    pub fn add_account(&self, institution_code: &str, new: NewAccount) -> Result<Account> {
        let institution = self.get_institution(institution_code)?;
        let account = Account::new(
            institution.id,
            &new.account_number,
            new.name,
            &new.currency,
            new.account_type,
        );
        account.validate().map_err(Error::validation)?;
        if !self
            .repository
            .find_accounts(institution.id, &account.account_number)?
            .is_empty()
        {
            return Err(Error::validation(format!(
                "account {} already exists at {}",
                account.account_number, institution.code
            )));
        }
        self.repository.add_account(&account)?;
        Ok(account)
    }

    // === Instruments ===

    pub fn list_instruments(&self) -> Result<Vec<Instrument>> {
        self.repository.get_instruments()
    }

    /// Create an instrument; an ISIN may be listed once per currency
    pub fn add_instrument(&self, new: NewInstrument) -> Result<Instrument> {
        let mut instrument = Instrument::new(new.name.trim(), &new.currency, new.sub_class);
        if let Some(raw) = new.isin.as_deref().filter(|s| !s.trim().is_empty()) {
            let isin = normalize_isin(raw)
                .map_err(|e| Error::validation(format!("invalid ISIN '{}': {}", raw, e)))?;
            let listed = self
                .repository
                .find_instruments_by_isin(&isin)?
                .into_iter()
                .any(|i| i.currency == instrument.currency);
            if listed {
                return Err(Error::validation(format!(
                    "instrument {} in {} already exists",
                    isin, instrument.currency
                )));
            }
            instrument = instrument.with_isin(isin);
        }
        if let Some(ticker) = new.ticker.as_deref().and_then(normalize_ticker) {
            instrument = instrument.with_ticker(ticker);
        }
        instrument.validate().map_err(Error::validation)?;
        self.repository.add_instrument(&instrument)?;
        Ok(instrument)
    }

    // === Positions and sessions ===

    pub fn positions(
        &self,
        institution_code: Option<&str>,
        account_type: Option<AccountType>,
    ) -> Result<Vec<PositionView>> {
        let institution_id = match institution_code {
            Some(code) => Some(self.get_institution(code)?.id),
            None => None,
        };
        let mut positions = self.repository.get_positions(institution_id)?;
        if let Some(account_type) = account_type {
            let accounts = self.repository.get_accounts(institution_id)?;
            positions.retain(|p| {
                accounts
                    .iter()
                    .any(|a| a.id == p.position.account_id && a.account_type == account_type)
            });
        }
        Ok(positions)
    }

    pub fn sessions(&self, limit: usize) -> Result<Vec<ImportSession>> {
        self.repository.get_sessions(limit)
    }
}
