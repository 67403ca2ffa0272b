//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::types::Type;
use duckdb::{params, params_from_iter, Connection, Row, Transaction};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountType, AssetSubClass, ImportSession, Institution, Instrument, Position,
    PositionView, RecordKind, SessionStatus,
};
use crate::ports::{CommitOutcome, ImportBatch, ReplaceScope, Repository};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
        || lower.contains("file is already open")
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Database(format!("{:#}", err))
    }
}

pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the store at `db_path`
    ///
    /// Opening retries with exponential backoff when another process holds
    /// the file, e.g. a second CLI invocation finishing its write.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = format!("{:#}", e);
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// A private in-memory store, migrated and ready
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let repository = Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        };
        repository.ensure_schema()?;
        Ok(repository)
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Cached extensions in ~/.duckdb/extensions must never be picked up
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
            .with_context(|| format!("cannot open {}", db_path.display()))
    }

    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("lock poisoned"))
    }
}

// === SQL ===

const INSTITUTION_COLUMNS: &str = "id, code, name, default_format, created_at";

const ACCOUNT_COLUMNS: &str =
    "id, institution_id, account_number, name, currency, account_type, created_at";

const INSTRUMENT_COLUMNS: &str = "id, name, isin, ticker, currency, sub_class, created_at";

const SESSION_COLUMNS: &str = "id, session_name, file_name, file_path, file_hash, file_type,
    file_size, institution_id, status, total_rows, successful_rows, failed_rows,
    duplicate_rows, cash_records, security_records, error_log, processing_notes,
    created_at, started_at, completed_at";

const INSERT_SESSION: &str = "INSERT INTO import_sessions (
        id, session_name, file_name, file_path, file_hash, file_type,
        file_size, institution_id, status, total_rows, successful_rows, failed_rows,
        duplicate_rows, cash_records, security_records, error_log, processing_notes,
        created_at, started_at, completed_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const POSITION_VIEW_SELECT: &str = "SELECT p.id, p.session_id, p.institution_id, p.account_id,
        p.instrument_id, p.kind, CAST(p.quantity AS VARCHAR), CAST(p.price AS VARCHAR),
        p.currency, CAST(p.as_of_date AS VARCHAR), p.source_line, p.created_at,
        i.code, a.account_number, n.name, n.isin
    FROM positions p
    JOIN institutions i ON i.id = p.institution_id
    JOIN accounts a ON a.id = p.account_id
    JOIN instruments n ON n.id = p.instrument_id";

/// WHERE clause and arguments selecting the positions in a replace scope
fn scope_filter(scope: &ReplaceScope) -> (&'static str, Vec<String>) {
    match scope.account_type {
        None => (
            "institution_id = ?",
            vec![scope.institution_id.to_string()],
        ),
        Some(account_type) => (
            "institution_id = ? AND account_id IN (
                SELECT id FROM accounts WHERE institution_id = ? AND account_type = ?)",
            vec![
                scope.institution_id.to_string(),
                scope.institution_id.to_string(),
                account_type.as_str().to_string(),
            ],
        ),
    }
}

// === Writes shared by the plain and transactional paths ===

fn insert_account(conn: &Connection, account: &Account) -> duckdb::Result<usize> {
    conn.execute(
        &format!("INSERT INTO accounts ({}) VALUES (?, ?, ?, ?, ?, ?, ?)", ACCOUNT_COLUMNS),
        params![
            account.id.to_string(),
            account.institution_id.to_string(),
            account.account_number,
            account.name,
            account.currency,
            account.account_type.as_str(),
            timestamp(&account.created_at),
        ],
    )
}

fn insert_instrument(conn: &Connection, instrument: &Instrument) -> duckdb::Result<usize> {
    conn.execute(
        &format!("INSERT INTO instruments ({}) VALUES (?, ?, ?, ?, ?, ?, ?)", INSTRUMENT_COLUMNS),
        params![
            instrument.id.to_string(),
            instrument.name,
            instrument.isin,
            instrument.ticker,
            instrument.currency,
            instrument.sub_class.as_str(),
            timestamp(&instrument.created_at),
        ],
    )
}

fn insert_position(conn: &Connection, position: &Position) -> duckdb::Result<usize> {
    conn.execute(
        "INSERT INTO positions (id, session_id, institution_id, account_id, instrument_id, kind,
            quantity, price, currency, as_of_date, source_line, created_at)
         VALUES (?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(28, 8)), CAST(? AS DECIMAL(28, 8)), ?,
            CAST(? AS DATE), ?, ?)",
        params![
            position.id.to_string(),
            position.session_id.to_string(),
            position.institution_id.to_string(),
            position.account_id.to_string(),
            position.instrument_id.to_string(),
            position.kind.as_str(),
            position.quantity.to_string(),
            position.price.map(|p| p.to_string()),
            position.currency,
            position.as_of_date.format("%Y-%m-%d").to_string(),
            position.source_line as i64,
            timestamp(&position.created_at),
        ],
    )
}

fn insert_session(conn: &Connection, session: &ImportSession) -> Result<()> {
    let error_log = serde_json::to_string(&session.error_log)?;
    let notes = serde_json::to_string(&session.processing_notes)?;
    conn.execute(
        INSERT_SESSION,
        params![
            session.id.to_string(),
            session.session_name,
            session.file_name,
            session.file_path,
            session.file_hash,
            session.file_type,
            session.file_size as i64,
            session.institution_id.map(|id| id.to_string()),
            session.status.as_str(),
            session.total_rows as i64,
            session.successful_rows as i64,
            session.failed_rows as i64,
            session.duplicate_rows as i64,
            session.cash_records as i64,
            session.security_records as i64,
            error_log,
            notes,
            timestamp(&session.created_at),
            session.started_at.as_ref().map(timestamp),
            session.completed_at.as_ref().map(timestamp),
        ],
    )?;
    Ok(())
}

fn delete_in_scope(conn: &Connection, scope: &ReplaceScope) -> duckdb::Result<usize> {
    let (filter, args) = scope_filter(scope);
    conn.execute(
        &format!("DELETE FROM positions WHERE {}", filter),
        params_from_iter(args.iter()),
    )
}

fn apply_batch(tx: &Transaction<'_>, batch: &ImportBatch) -> Result<CommitOutcome> {
    let removed_positions = match &batch.replace {
        Some(scope) => delete_in_scope(tx, scope)?,
        None => 0,
    };
    for account in &batch.accounts {
        insert_account(tx, account)?;
    }
    for instrument in &batch.instruments {
        insert_instrument(tx, instrument)?;
    }
    for position in &batch.positions {
        insert_position(tx, position)?;
    }
    insert_session(tx, &batch.session)?;
    Ok(CommitOutcome {
        removed_positions,
        inserted_positions: batch.positions.len(),
    })
}

impl Repository for DuckDbRepository {
    // === Institutions ===

    fn add_institution(&self, institution: &Institution) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO institutions ({}) VALUES (?, ?, ?, ?, ?)", INSTITUTION_COLUMNS),
            params![
                institution.id.to_string(),
                institution.code,
                institution.name,
                institution.default_format,
                timestamp(&institution.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_institutions(&self) -> Result<Vec<Institution>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM institutions ORDER BY code",
            INSTITUTION_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_institution)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn get_institution_by_code(&self, code: &str) -> Result<Option<Institution>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM institutions WHERE code = ?",
            INSTITUTION_COLUMNS
        ))?;
        let mut rows = stmt.query_map([Institution::normalize_code(code)], row_to_institution)?;
        Ok(rows.next().transpose()?)
    }

    // === Accounts ===

    fn add_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        insert_account(&conn, account)?;
        Ok(())
    }

    fn get_accounts(&self, institution_id: Option<Uuid>) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let (filter, args) = match institution_id {
            Some(id) => ("WHERE institution_id = ?", vec![id.to_string()]),
            None => ("", Vec::new()),
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts {} ORDER BY account_number",
            ACCOUNT_COLUMNS, filter
        ))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_account)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn find_accounts(&self, institution_id: Uuid, account_number: &str) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE institution_id = ? AND account_number = ?",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![institution_id.to_string(), account_number],
            row_to_account,
        )?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    // === Instruments ===

    fn add_instrument(&self, instrument: &Instrument) -> Result<()> {
        let conn = self.conn()?;
        insert_instrument(&conn, instrument)?;
        Ok(())
    }

    fn get_instruments(&self) -> Result<Vec<Instrument>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instruments ORDER BY name, currency",
            INSTRUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_instrument)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn find_instruments_by_isin(&self, isin: &str) -> Result<Vec<Instrument>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instruments WHERE isin = ?",
            INSTRUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([isin], row_to_instrument)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn find_instruments_by_ticker(&self, ticker: &str) -> Result<Vec<Instrument>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instruments WHERE upper(ticker) = upper(?)",
            INSTRUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([ticker], row_to_instrument)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn find_instruments_by_name(&self, name: &str, currency: &str) -> Result<Vec<Instrument>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instruments WHERE lower(name) = lower(?) AND currency = ?",
            INSTRUMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![name.trim(), currency], row_to_instrument)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    // === Positions ===

    fn get_positions(&self, institution_id: Option<Uuid>) -> Result<Vec<PositionView>> {
        let conn = self.conn()?;
        let (filter, args) = match institution_id {
            Some(id) => ("WHERE p.institution_id = ?", vec![id.to_string()]),
            None => ("", Vec::new()),
        };
        let mut stmt = conn.prepare(&format!(
            "{} {} ORDER BY i.code, a.account_number, p.source_line",
            POSITION_VIEW_SELECT, filter
        ))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_position_view)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn count_positions(&self, scope: &ReplaceScope) -> Result<usize> {
        let conn = self.conn()?;
        let (filter, args) = scope_filter(scope);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM positions WHERE {}", filter),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_positions(&self, scope: &ReplaceScope) -> Result<usize> {
        let conn = self.conn()?;
        Ok(delete_in_scope(&conn, scope)?)
    }

    // === Sessions ===

    fn find_completed_session_by_hash(&self, file_hash: &str) -> Result<Option<ImportSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_sessions
             WHERE file_hash = ? AND status = 'completed'
             ORDER BY created_at DESC LIMIT 1",
            SESSION_COLUMNS
        ))?;
        let mut rows = stmt.query_map([file_hash], row_to_session)?;
        Ok(rows.next().transpose()?)
    }

    fn get_sessions(&self, limit: usize) -> Result<Vec<ImportSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_sessions ORDER BY created_at DESC LIMIT ?",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_session)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    fn record_session(&self, session: &ImportSession) -> Result<()> {
        let conn = self.conn()?;
        insert_session(&conn, session)
    }

    fn commit_import(&self, batch: &ImportBatch) -> Result<CommitOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        // Dropping `tx` on the error path rolls everything back
        let outcome = apply_batch(&tx, batch)?;
        tx.commit()?;
        Ok(outcome)
    }
}

// === Row mapping ===

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error(idx: usize, message: String) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn get_uuid(row: &Row<'_>, idx: usize) -> duckdb::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, format!("bad uuid '{}': {}", raw, e)))
}

fn get_opt_uuid(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|e| conversion_error(idx, format!("bad uuid '{}': {}", raw, e))),
        None => Ok(None),
    }
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw)))
}

fn get_opt_timestamp(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw))),
        None => Ok(None),
    }
}

fn get_decimal(row: &Row<'_>, idx: usize) -> duckdb::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map(|d| d.normalize())
        .map_err(|e| conversion_error(idx, format!("bad decimal '{}': {}", raw, e)))
}

fn get_opt_decimal(row: &Row<'_>, idx: usize) -> duckdb::Result<Option<Decimal>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => get_decimal(row, idx).map(Some),
        None => Ok(None),
    }
}

fn get_parsed<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> duckdb::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion_error(idx, e))
}

fn get_json_list(row: &Row<'_>, idx: usize) -> duckdb::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn get_count(row: &Row<'_>, idx: usize) -> duckdb::Result<usize> {
    Ok(row.get::<_, i64>(idx)?.max(0) as usize)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn row_to_institution(row: &Row<'_>) -> duckdb::Result<Institution> {
    Ok(Institution {
        id: get_uuid(row, 0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        default_format: row.get(3)?,
        created_at: get_timestamp(row, 4)?,
    })
}

fn row_to_account(row: &Row<'_>) -> duckdb::Result<Account> {
    Ok(Account {
        id: get_uuid(row, 0)?,
        institution_id: get_uuid(row, 1)?,
        account_number: row.get(2)?,
        name: row.get(3)?,
        currency: row.get(4)?,
        account_type: get_parsed::<AccountType>(row, 5)?,
        created_at: get_timestamp(row, 6)?,
    })
}

fn row_to_instrument(row: &Row<'_>) -> duckdb::Result<Instrument> {
    Ok(Instrument {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        isin: row.get(2)?,
        ticker: row.get(3)?,
        currency: row.get(4)?,
        sub_class: get_parsed::<AssetSubClass>(row, 5)?,
        created_at: get_timestamp(row, 6)?,
    })
}

fn row_to_position_view(row: &Row<'_>) -> duckdb::Result<PositionView> {
    let date: String = row.get(9)?;
    let as_of_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| conversion_error(9, format!("bad date '{}': {}", date, e)))?;
    Ok(PositionView {
        position: Position {
            id: get_uuid(row, 0)?,
            session_id: get_uuid(row, 1)?,
            institution_id: get_uuid(row, 2)?,
            account_id: get_uuid(row, 3)?,
            instrument_id: get_uuid(row, 4)?,
            kind: get_parsed::<RecordKind>(row, 5)?,
            quantity: get_decimal(row, 6)?,
            price: get_opt_decimal(row, 7)?,
            currency: row.get(8)?,
            as_of_date,
            source_line: get_count(row, 10)?,
            created_at: get_timestamp(row, 11)?,
        },
        institution_code: row.get(12)?,
        account_number: row.get(13)?,
        instrument_name: row.get(14)?,
        isin: row.get(15)?,
    })
}

fn row_to_session(row: &Row<'_>) -> duckdb::Result<ImportSession> {
    Ok(ImportSession {
        id: get_uuid(row, 0)?,
        session_name: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        file_hash: row.get(4)?,
        file_type: row.get(5)?,
        file_size: row.get::<_, i64>(6)?.max(0) as u64,
        institution_id: get_opt_uuid(row, 7)?,
        status: get_parsed::<SessionStatus>(row, 8)?,
        total_rows: get_count(row, 9)?,
        successful_rows: get_count(row, 10)?,
        failed_rows: get_count(row, 11)?,
        duplicate_rows: get_count(row, 12)?,
        cash_records: get_count(row, 13)?,
        security_records: get_count(row, 14)?,
        error_log: get_json_list(row, 15)?,
        processing_notes: get_json_list(row, 16)?,
        created_at: get_timestamp(row, 17)?,
        started_at: get_opt_timestamp(row, 18)?,
        completed_at: get_opt_timestamp(row, 19)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileMeta;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    struct Fixture {
        repo: DuckDbRepository,
        ubs: Institution,
        custody: Account,
        cash: Account,
        nestle: Instrument,
    }

    fn fixture() -> Fixture {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        let ubs = Institution::new("UBS", "UBS Switzerland AG");
        repo.add_institution(&ubs).unwrap();
        let custody = Account::new(ubs.id, "0233-123456.01", "Custody", "CHF", AccountType::Custody);
        let cash = Account::new(ubs.id, "0233-123456.60", "Current", "CHF", AccountType::Cash);
        repo.add_account(&custody).unwrap();
        repo.add_account(&cash).unwrap();
        let nestle = Instrument::new("Nestle SA", "CHF", AssetSubClass::Equity)
            .with_isin("CH0038863350")
            .with_ticker("NESN");
        repo.add_instrument(&nestle).unwrap();
        Fixture {
            repo,
            ubs,
            custody,
            cash,
            nestle,
        }
    }

    fn completed_session(institution: &Institution, name: &str, rows: usize) -> ImportSession {
        let meta = FileMeta::from_bytes(Path::new(name), name.as_bytes());
        let mut session = ImportSession::new(meta, Some(institution));
        session.start().unwrap();
        for _ in 0..rows {
            session.record_success(RecordKind::Security);
        }
        session.total_rows = rows;
        session.complete().unwrap();
        session
    }

    fn position(f: &Fixture, session: &ImportSession, account: &Account, qty: &str) -> Position {
        Position {
            id: Uuid::new_v4(),
            session_id: session.id,
            institution_id: f.ubs.id,
            account_id: account.id,
            instrument_id: f.nestle.id,
            kind: RecordKind::Security,
            quantity: dec(qty),
            price: Some(dec("95.5")),
            currency: "CHF".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            source_line: 2,
            created_at: Utc::now(),
        }
    }

    fn batch(session: ImportSession, positions: Vec<Position>) -> ImportBatch {
        ImportBatch {
            session,
            replace: None,
            accounts: Vec::new(),
            instruments: Vec::new(),
            positions,
        }
    }

    #[test]
    fn test_reference_lookups() {
        let f = fixture();
        assert_eq!(f.repo.get_institution_by_code(" ubs").unwrap(), Some(f.ubs.clone()));
        assert!(f.repo.get_institution_by_code("ZKB").unwrap().is_none());

        let found = f.repo.find_accounts(f.ubs.id, "0233-123456.01").unwrap();
        assert_eq!(found, vec![f.custody.clone()]);
        assert_eq!(f.repo.get_accounts(Some(f.ubs.id)).unwrap().len(), 2);

        assert_eq!(f.repo.find_instruments_by_isin("CH0038863350").unwrap().len(), 1);
        assert_eq!(f.repo.find_instruments_by_ticker("nesn").unwrap().len(), 1);
        assert_eq!(f.repo.find_instruments_by_name("NESTLE SA", "CHF").unwrap().len(), 1);
        assert!(f.repo.find_instruments_by_name("Nestle SA", "USD").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_institution_code_rejected() {
        let f = fixture();
        let again = Institution::new("UBS", "Another UBS");
        assert!(matches!(f.repo.add_institution(&again), Err(Error::Database(_))));
    }

    #[test]
    fn test_commit_round_trips_decimals_and_session() {
        let f = fixture();
        let session = completed_session(&f.ubs, "UBS_20241231.csv", 1);
        let mut p = position(&f, &session, &f.custody, "1200.123456");
        p.price = None;
        let outcome = f.repo.commit_import(&batch(session.clone(), vec![p])).unwrap();
        assert_eq!(outcome.inserted_positions, 1);

        let views = f.repo.get_positions(Some(f.ubs.id)).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].position.quantity, dec("1200.123456"));
        assert_eq!(views[0].position.price, None);
        assert_eq!(views[0].instrument_name, "Nestle SA");
        assert_eq!(views[0].institution_code, "UBS");

        let stored = f
            .repo
            .find_completed_session_by_hash(&session.file_hash)
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, session.id);
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.successful_rows, 1);
    }

    #[test]
    fn test_commit_is_atomic() {
        let f = fixture();
        let session = completed_session(&f.ubs, "UBS_20241231.csv", 2);
        let first = position(&f, &session, &f.custody, "10");
        let mut clash = position(&f, &session, &f.custody, "20");
        clash.id = first.id;

        let staged = Instrument::new("Roche Holding", "CHF", AssetSubClass::Equity);
        let mut failing = batch(session.clone(), vec![first, clash]);
        failing.instruments.push(staged.clone());

        assert!(f.repo.commit_import(&failing).is_err());
        assert!(f.repo.get_positions(None).unwrap().is_empty());
        assert!(f.repo.get_sessions(10).unwrap().is_empty());
        assert!(f.repo.find_instruments_by_name("Roche Holding", "CHF").unwrap().is_empty());
    }

    #[test]
    fn test_replace_scope_by_account_type() {
        let f = fixture();
        let session = completed_session(&f.ubs, "a.csv", 2);
        let positions = vec![
            position(&f, &session, &f.custody, "10"),
            position(&f, &session, &f.cash, "5000"),
        ];
        f.repo.commit_import(&batch(session, positions)).unwrap();

        let cash_scope = ReplaceScope {
            institution_id: f.ubs.id,
            account_type: Some(AccountType::Cash),
        };
        assert_eq!(f.repo.count_positions(&cash_scope).unwrap(), 1);
        assert_eq!(f.repo.count_positions(&ReplaceScope::institution(f.ubs.id)).unwrap(), 2);

        let next = completed_session(&f.ubs, "b.csv", 0);
        let mut replacing = batch(next, Vec::new());
        replacing.replace = Some(cash_scope);
        let outcome = f.repo.commit_import(&replacing).unwrap();
        assert_eq!(outcome.removed_positions, 1);

        let left = f.repo.get_positions(None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].position.account_id, f.custody.id);
    }

    #[test]
    fn test_unbalanced_session_rejected_by_store() {
        let f = fixture();
        let mut session = completed_session(&f.ubs, "a.csv", 2);
        session.total_rows = 3;
        assert!(f.repo.record_session(&session).is_err());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }
}
