//! Repository port - database abstraction

use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, AccountType, ImportSession, Institution, Instrument, Position, PositionView};

/// Positions a replace-mode import removes before inserting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceScope {
    pub institution_id: Uuid,
    /// Restrict to accounts of this type, all accounts when `None`
    pub account_type: Option<AccountType>,
}

impl ReplaceScope {
    pub fn institution(institution_id: Uuid) -> Self {
        Self {
            institution_id,
            account_type: None,
        }
    }
}

/// Everything one successful import writes, applied in a single transaction
#[derive(Debug, Clone)]
pub struct ImportBatch {
    /// The completed session row
    pub session: ImportSession,
    pub replace: Option<ReplaceScope>,
    /// Accounts created during resolution
    pub accounts: Vec<Account>,
    /// Instruments created during resolution
    pub instruments: Vec<Instrument>,
    pub positions: Vec<Position>,
}

/// Row counts written by [`Repository::commit_import`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    pub removed_positions: usize,
    pub inserted_positions: usize,
}

/// Database repository abstraction
///
/// This trait defines all database operations the import pipeline and the
/// reference services need. Implementations (adapters) provide the actual
/// database access logic.
pub trait Repository: Send + Sync {
    // === Institutions ===

    fn add_institution(&self, institution: &Institution) -> Result<()>;

    fn get_institutions(&self) -> Result<Vec<Institution>>;

    fn get_institution_by_code(&self, code: &str) -> Result<Option<Institution>>;

    // === Accounts ===

    fn add_account(&self, account: &Account) -> Result<()>;

    /// All accounts, optionally restricted to one institution
    fn get_accounts(&self, institution_id: Option<Uuid>) -> Result<Vec<Account>>;

    /// Exact match on (institution, account number)
    fn find_accounts(&self, institution_id: Uuid, account_number: &str) -> Result<Vec<Account>>;

    // === Instruments ===

    fn add_instrument(&self, instrument: &Instrument) -> Result<()>;

    fn get_instruments(&self) -> Result<Vec<Instrument>>;

    fn find_instruments_by_isin(&self, isin: &str) -> Result<Vec<Instrument>>;

    /// Case-insensitive ticker match
    fn find_instruments_by_ticker(&self, ticker: &str) -> Result<Vec<Instrument>>;

    /// Case-insensitive name match within one currency
    fn find_instruments_by_name(&self, name: &str, currency: &str) -> Result<Vec<Instrument>>;

    // === Positions ===

    fn get_positions(&self, institution_id: Option<Uuid>) -> Result<Vec<PositionView>>;

    fn count_positions(&self, scope: &ReplaceScope) -> Result<usize>;

    /// Delete positions in scope, returning how many were removed
    fn delete_positions(&self, scope: &ReplaceScope) -> Result<usize>;

    // === Sessions ===

    fn find_completed_session_by_hash(&self, file_hash: &str) -> Result<Option<ImportSession>>;

    /// Most recent sessions first
    fn get_sessions(&self, limit: usize) -> Result<Vec<ImportSession>>;

    /// Write a session row on its own (used for failed sessions)
    fn record_session(&self, session: &ImportSession) -> Result<()>;

    /// Apply one import atomically: scope delete, staged entities, positions
    /// and the session row all commit together or not at all.
    fn commit_import(&self, batch: &ImportBatch) -> Result<CommitOutcome>;
}
