//! Logging service - structured import log in DuckDB
//!
//! Events go to logs.duckdb next to the store. Only file names, counts and
//! error messages are recorded; quantities, prices and account numbers never
//! are.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::{ImportError, ImportSession};
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::migration::MigrationService;

pub const IMPORT_COMPLETED: &str = "import_completed";
pub const IMPORT_FAILED: &str = "import_failed";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Timestamp in the lower 48 bits, a per-millisecond counter in the upper 16
fn generate_id() -> u64 {
    let timestamp = now_ms().max(0) as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Which front end wrote the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    Library,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Library => "library",
        }
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_rows: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_rows: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_file(mut self, file_name: impl Into<String>, format: Option<&str>) -> Self {
        self.file_name = Some(file_name.into());
        self.format = format.map(str::to_string);
        self
    }

    pub fn with_rows(mut self, parsed: usize, failed: usize) -> Self {
        self.parsed_rows = Some(i32::try_from(parsed).unwrap_or(i32::MAX));
        self.failed_rows = Some(i32::try_from(failed).unwrap_or(i32::MAX));
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: i64,
    pub entry_point: String,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub file_name: Option<String>,
    pub format: Option<String>,
    pub parsed_rows: Option<i32>,
    pub failed_rows: Option<i32>,
    pub error_message: Option<String>,
}

impl LogEntry {
    /// `[2025-01-31 09:12:44] UBS_20250131.csv → Success: 12 records, 1 errors`
    pub fn import_line(&self) -> String {
        let at = DateTime::<Utc>::from_timestamp_millis(self.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| self.timestamp.to_string());
        let file_name = self.file_name.as_deref().unwrap_or("<unknown>");
        match &self.error_message {
            Some(message) => format!("[{}] {} → Failed: {}", at, file_name, message),
            None => format!(
                "[{}] {} → Success: {} records, {} errors",
                at,
                file_name,
                self.parsed_rows.unwrap_or(0),
                self.failed_rows.unwrap_or(0)
            ),
        }
    }
}

const ENTRY_COLUMNS: &str = "id, timestamp, entry_point, app_version, platform, event, command, \
     file_name, format, parsed_rows, failed_rows, error_message";

fn row_to_entry(row: &duckdb::Row<'_>) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        entry_point: row.get(2)?,
        app_version: row.get(3)?,
        platform: row.get(4)?,
        event: row.get(5)?,
        command: row.get(6)?,
        file_name: row.get(7)?,
        format: row.get(8)?,
        parsed_rows: row.get(9)?,
        failed_rows: row.get(10)?,
        error_message: row.get(11)?,
    })
}

/// Service for the structured import log
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in the data directory and migrate it
    pub fn new(
        data_dir: &Path,
        entry_point: EntryPoint,
        app_version: impl Into<String>,
    ) -> Result<Self> {
        let db_path = data_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS).run_pending()?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
            platform: detect_platform(),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    /// Record an event; entry point, version and platform are added here
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO sys_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ),
            duckdb::params![
                generate_id(),
                now_ms(),
                self.entry_point.as_str(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.command,
                &event.file_name,
                &event.format,
                &event.parsed_rows,
                &event.failed_rows,
                &event.error_message,
            ],
        )?;
        Ok(())
    }

    /// Log a CLI command execution
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    /// One event per finished import
    pub fn log_import(
        &self,
        file_name: &str,
        format: Option<&str>,
        outcome: std::result::Result<&ImportSession, &ImportError>,
    ) -> Result<()> {
        let event = match outcome {
            Ok(session) => LogEvent::new(IMPORT_COMPLETED)
                .with_file(file_name, format)
                .with_rows(session.successful_rows, session.failed_rows),
            Err(e) => LogEvent::new(IMPORT_FAILED)
                .with_file(file_name, format)
                .with_error(e.to_string()),
        };
        self.log(event)
    }

    /// Most recent imports rendered as log lines, newest first
    pub fn import_log_lines(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .query(
                "WHERE event IN (?, ?)",
                &[&IMPORT_COMPLETED, &IMPORT_FAILED],
                limit,
            )?
            .iter()
            .map(LogEntry::import_line)
            .collect())
    }

    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query("", &[], limit)
    }

    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query("WHERE error_message IS NOT NULL", &[], limit)
    }

    fn query(
        &self,
        filter: &str,
        args: &[&dyn duckdb::ToSql],
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_logs {} ORDER BY timestamp DESC, id DESC LIMIT {}",
            ENTRY_COLUMNS, filter, limit
        ))?;
        let entries = stmt
            .query_map(args, row_to_entry)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete logs older than the given unix milliseconds
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    /// Copy the log database for troubleshooting
    pub fn export(&self, output_path: &Path) -> Result<PathBuf> {
        let conn = self.conn()?;
        conn.execute("CHECKPOINT", [])?;
        std::fs::copy(&self.db_path, output_path)?;
        Ok(output_path.to_path_buf())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileMeta, Institution, RecordKind};
    use tempfile::tempdir;

    fn completed_session() -> ImportSession {
        let meta = FileMeta::from_bytes(Path::new("UBS_20241231.csv"), b"x");
        let mut session = ImportSession::new(meta, Some(&Institution::new("UBS", "UBS")));
        session.start().unwrap();
        session.total_rows = 3;
        session.record_success(RecordKind::Security);
        session.record_success(RecordKind::Cash);
        session.record_failure("line 4: invalid quantity '1x': not a number");
        session.complete().unwrap();
        session
    }

    #[test]
    fn test_logging_service_creation() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        assert!(service.db_path().exists());
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_log_command() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        service.log_command("import").unwrap();

        let entries = service.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "command_executed");
        assert_eq!(entries[0].command.as_deref(), Some("import"));
        assert_eq!(entries[0].entry_point, "cli");
        assert_eq!(entries[0].app_version, "1.0.0");
    }

    #[test]
    fn test_import_success_line() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Library, "1.0.0").unwrap();
        let session = completed_session();
        service
            .log_import("UBS_20241231.csv", Some("csv"), Ok(&session))
            .unwrap();

        let lines = service.import_log_lines(5).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] UBS_20241231.csv → Success: 2 records, 1 errors"));
        assert!(service.get_errors(5).unwrap().is_empty());
    }

    #[test]
    fn test_import_failure_line() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        let err = ImportError::Busy {
            file_name: "UBS_20241231.csv".to_string(),
        };
        service.log_import("UBS_20241231.csv", None, Err(&err)).unwrap();
        service.log_command("status").unwrap();

        let lines = service.import_log_lines(5).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(
            "UBS_20241231.csv → Failed: UBS_20241231.csv: another import is already running"
        ));

        let errors = service.get_errors(5).unwrap();
        assert_eq!(errors[0].event, IMPORT_FAILED);
        assert_eq!(errors[0].format, None);
    }

    #[test]
    fn test_count_and_delete() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        service.log_command("a").unwrap();
        service.log_command("b").unwrap();
        service.log_command("c").unwrap();
        assert_eq!(service.count().unwrap(), 3);

        let deleted = service.delete_before(now_ms() + 1000).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_export() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        service.log_command("logs").unwrap();

        let export_path = dir.path().join("export.duckdb");
        service.export(&export_path).unwrap();
        assert!(export_path.exists());
    }
}
