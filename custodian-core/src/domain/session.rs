//! Import session domain model

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::institution::Institution;
use super::record::RecordKind;

/// Lifecycle state of an import session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// Identity of an imported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub file_name: String,
    pub file_path: String,
    /// SHA-256 of the file content, hex encoded
    pub file_hash: String,
    /// Lowercased extension, empty when the file has none
    pub file_type: String,
    pub file_size: u64,
}

impl FileMeta {
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            file_path: path.display().to_string(),
            file_hash: Self::hash_bytes(bytes),
            file_type: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            file_size: bytes.len() as u64,
        }
    }

    pub fn hash_bytes(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

/// Immutable result of a finished import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionImportSummary {
    pub total_rows: usize,
    pub parsed_rows: usize,
    pub cash_accounts: usize,
    pub security_records: usize,
}

/// One attempt to import one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSession {
    pub id: Uuid,
    pub session_name: String,
    pub file_name: String,
    pub file_path: String,
    pub file_hash: String,
    pub file_type: String,
    pub file_size: u64,
    pub institution_id: Option<Uuid>,
    pub status: SessionStatus,
    pub total_rows: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    pub duplicate_rows: usize,
    pub cash_records: usize,
    pub security_records: usize,
    pub error_log: Vec<String>,
    pub processing_notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportSession {
    pub fn new(meta: FileMeta, institution: Option<&Institution>) -> Self {
        let session_name = match institution {
            Some(institution) => format!("{} {}", institution.code, meta.file_name),
            None => meta.file_name.clone(),
        };
        Self {
            id: Uuid::new_v4(),
            session_name,
            file_name: meta.file_name,
            file_path: meta.file_path,
            file_hash: meta.file_hash,
            file_type: meta.file_type,
            file_size: meta.file_size,
            institution_id: institution.map(|i| i.id),
            status: SessionStatus::Pending,
            total_rows: 0,
            successful_rows: 0,
            failed_rows: 0,
            duplicate_rows: 0,
            cash_records: 0,
            security_records: 0,
            error_log: Vec::new(),
            processing_notes: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Pending -> Running
    pub fn start(&mut self) -> Result<(), &'static str> {
        if self.status != SessionStatus::Pending {
            return Err("session can only start from pending");
        }
        self.status = SessionStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_success(&mut self, kind: RecordKind) {
        self.successful_rows += 1;
        match kind {
            RecordKind::Cash => self.cash_records += 1,
            RecordKind::Security => self.security_records += 1,
        }
    }

    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.failed_rows += 1;
        self.error_log.push(message.into());
    }

    pub fn record_duplicate(&mut self, message: impl Into<String>) {
        self.duplicate_rows += 1;
        self.processing_notes.push(message.into());
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.processing_notes.push(message.into());
    }

    /// Rows accounted for so far
    pub fn processed_rows(&self) -> usize {
        self.successful_rows + self.failed_rows + self.duplicate_rows
    }

    pub fn counts_balanced(&self) -> bool {
        self.processed_rows() == self.total_rows
    }

    /// Running -> Completed. Every row must be accounted for.
    pub fn complete(&mut self) -> Result<(), &'static str> {
        if self.status != SessionStatus::Running {
            return Err("only a running session can complete");
        }
        if !self.counts_balanced() {
            return Err("row counts do not add up to the total");
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal state -> Failed. Nothing from this session is kept,
    /// so every row is counted as failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), &'static str> {
        if self.status.is_terminal() {
            return Err("session already finished");
        }
        let processed = self.processed_rows();
        self.error_log.push(format!(
            "{} ({} of {} rows processed)",
            reason.into(),
            processed,
            self.total_rows
        ));
        self.successful_rows = 0;
        self.duplicate_rows = 0;
        self.cash_records = 0;
        self.security_records = 0;
        self.failed_rows = self.total_rows;
        self.status = SessionStatus::Failed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn summary(&self) -> PositionImportSummary {
        PositionImportSummary {
            total_rows: self.total_rows,
            parsed_rows: self.successful_rows,
            cash_accounts: self.cash_records,
            security_records: self.security_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ImportSession {
        let meta = FileMeta::from_bytes(Path::new("/tmp/UBS_20241231.csv"), b"a;b\n1;2\n");
        let institution = Institution::new("UBS", "UBS Switzerland AG");
        ImportSession::new(meta, Some(&institution))
    }

    #[test]
    fn test_file_meta() {
        let meta = FileMeta::from_bytes(Path::new("/data/Statement.CSV"), b"abc");
        assert_eq!(meta.file_name, "Statement.CSV");
        assert_eq!(meta.file_type, "csv");
        assert_eq!(meta.file_size, 3);
        assert_eq!(
            meta.file_hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_default_session_name() {
        assert_eq!(session().session_name, "UBS UBS_20241231.csv");
    }

    #[test]
    fn test_lifecycle() {
        let mut s = session();
        assert!(s.complete().is_err());
        s.start().unwrap();
        assert!(s.start().is_err());

        s.total_rows = 3;
        s.record_success(RecordKind::Security);
        s.record_success(RecordKind::Cash);
        assert!(s.complete().is_err());
        s.record_failure("line 4: invalid quantity");
        s.complete().unwrap();

        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.fail("late").is_err());
        let summary = s.summary();
        assert_eq!(summary.parsed_rows, 2);
        assert_eq!(summary.cash_accounts, 1);
        assert_eq!(summary.security_records, 1);
    }

    #[test]
    fn test_fail_closes_counts() {
        let mut s = session();
        s.start().unwrap();
        s.total_rows = 5;
        s.record_success(RecordKind::Security);
        s.record_duplicate("ignored");
        s.fail("aborted by user").unwrap();

        assert_eq!(s.status, SessionStatus::Failed);
        assert_eq!(s.successful_rows, 0);
        assert_eq!(s.duplicate_rows, 0);
        assert_eq!(s.failed_rows, 5);
        assert!(s.counts_balanced());
        assert_eq!(s.error_log.last().unwrap(), "aborted by user (2 of 5 rows processed)");
        assert_eq!(s.summary().parsed_rows, 0);
    }
}
