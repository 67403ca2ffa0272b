//! Statement parser port
//!
//! A parser turns the raw bytes of one statement file into loosely-typed rows.
//! It knows the layout of one institution or one file format and nothing about
//! accounts, instruments or the store.

use crate::domain::{NumberFormat, ParseDiagnostic, ParseError, RawRow, Severity};

/// Rows and per-row diagnostics from one parse pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    pub rows: Vec<RawRow>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseOutput {
    /// Rows that looked like data but were dropped
    pub fn rejected(&self) -> impl Iterator<Item = &ParseDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Rejected)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ParseDiagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Every row the import has to account for
    pub fn total_rows(&self) -> usize {
        self.rows.len() + self.rejected().count()
    }
}

/// How the normalizer should read values produced by a parser
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizeOptions {
    pub number_format: NumberFormat,
    /// chrono formats tried before the built-in list
    pub date_formats: Vec<String>,
    /// Whether negative quantities (short positions) are legal
    pub allow_negative_quantity: bool,
}

/// Format parser trait
pub trait StatementParser: Send + Sync {
    /// Registry tag, e.g. "csv"
    fn format(&self) -> &str;

    fn description(&self) -> &str;

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::default()
    }

    /// Parse a whole file. Only file-level problems are errors; bad rows
    /// become diagnostics.
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutput, ParseError>;
}
