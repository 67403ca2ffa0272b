//! Result and error types for the core library

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Core library error type, used by the repository port and reference operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// A file-level parse failure. Fatal for the import, nothing is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ParseError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// A row-level validation failure. The row is skipped, the import continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ValidationError {
    pub line: usize,
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(line: usize, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            line,
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    /// A required field is absent or empty
    pub fn missing(line: usize, field: &str) -> Self {
        Self::new(line, Some(field), format!("missing required field '{}'", field))
    }

    /// A field is present but cannot be interpreted
    pub fn invalid(line: usize, field: &str, value: &str, reason: &str) -> Self {
        Self::new(
            line,
            Some(field),
            format!("invalid {} '{}': {}", field, value, reason),
        )
    }
}

/// Session-level import failure, always surfaced to the caller
#[derive(Error, Debug, Clone)]
pub enum ImportError {
    #[error("{file_name}: could not parse statement: {message}")]
    Parse { file_name: String, message: String },

    #[error("{file_name}: import aborted after {rows_processed} rows, nothing was saved")]
    ResolutionAborted {
        file_name: String,
        rows_processed: usize,
    },

    #[error(
        "{file_name}: identical file was already imported on {} (session {session_id}); use replace mode to re-import",
        imported_at.format("%Y-%m-%d %H:%M")
    )]
    DuplicateFile {
        file_name: String,
        session_id: Uuid,
        imported_at: DateTime<Utc>,
    },

    #[error("{file_name}: failed to save positions after {rows_processed} rows: {message}")]
    Persistence {
        file_name: String,
        rows_processed: usize,
        message: String,
    },

    #[error("{file_name}: another import is already running against this store")]
    Busy { file_name: String },

    #[error("{file_name}: {message}")]
    Io { file_name: String, message: String },

    #[error("{file_name}: {message}")]
    InvalidRequest { file_name: String, message: String },
}

impl ImportError {
    /// Name of the file the failed import was reading
    pub fn file_name(&self) -> &str {
        match self {
            Self::Parse { file_name, .. }
            | Self::ResolutionAborted { file_name, .. }
            | Self::DuplicateFile { file_name, .. }
            | Self::Persistence { file_name, .. }
            | Self::Busy { file_name }
            | Self::Io { file_name, .. }
            | Self::InvalidRequest { file_name, .. } => file_name,
        }
    }

    /// Rows processed before the failure, zero for failures before row processing
    pub fn rows_processed(&self) -> usize {
        match self {
            Self::ResolutionAborted { rows_processed, .. }
            | Self::Persistence { rows_processed, .. } => *rows_processed,
            _ => 0,
        }
    }

    /// Short machine-readable kind, used in logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::ResolutionAborted { .. } => "resolution_aborted",
            Self::DuplicateFile { .. } => "duplicate_file",
            Self::Persistence { .. } => "persistence_error",
            Self::Busy { .. } => "busy",
            Self::Io { .. } => "io_error",
            Self::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

impl<T> From<std::result::Result<T, ImportError>> for OperationResult<T> {
    fn from(result: std::result::Result<T, ImportError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let mut context = HashMap::new();
                context.insert("kind".to_string(), serde_json::json!(e.kind()));
                context.insert("fileName".to_string(), serde_json::json!(e.file_name()));
                context.insert(
                    "rowsProcessed".to_string(),
                    serde_json::json!(e.rows_processed()),
                );
                Self::fail_with_context(e.to_string(), context)
            }
        }
    }
}
