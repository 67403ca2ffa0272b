//! Row-level data flowing from parsers through the normalizer

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical keys parsers use when filling a [`RawRow`]
pub mod fields {
    pub const ACCOUNT_NUMBER: &str = "account_number";
    pub const ACCOUNT_NAME: &str = "account_name";
    pub const INSTRUMENT: &str = "instrument";
    pub const TICKER: &str = "ticker";
    pub const ISIN: &str = "isin";
    pub const CURRENCY: &str = "currency";
    pub const QUANTITY: &str = "quantity";
    pub const PRICE: &str = "price";
    pub const AS_OF_DATE: &str = "as_of_date";
    pub const ASSET_CLASS: &str = "asset_class";

    pub const ALL: &[&str] = &[
        ACCOUNT_NUMBER,
        ACCOUNT_NAME,
        INSTRUMENT,
        TICKER,
        ISIN,
        CURRENCY,
        QUANTITY,
        PRICE,
        AS_OF_DATE,
        ASSET_CLASS,
    ];
}

/// Where a row came from in the source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    /// 1-based line (text formats) or row (spreadsheets)
    pub line: usize,
    /// Section, sheet or page name when the format has one
    pub section: Option<String>,
}

impl SourceRef {
    pub fn line(line: usize) -> Self {
        Self {
            line,
            section: None,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{} line {}", section, self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

/// Loosely-typed row produced by a parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub source: SourceRef,
    values: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(line: usize) -> Self {
        Self {
            source: SourceRef::line(line),
            values: BTreeMap::new(),
        }
    }

    pub fn with_section(mut self, section: Option<&str>) -> Self {
        self.source.section = section.map(str::to_string);
        self
    }

    /// Store a trimmed value. Blank values are not stored.
    pub fn set(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    /// Store a value only when the key has none yet
    pub fn set_default(&mut self, key: &str, value: &str) {
        if !self.values.contains_key(key) {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Severity of a parse diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, the row was deliberately skipped (totals, prose)
    Warning,
    /// The row looked like data but could not be read; counted as failed
    Rejected,
}

/// A per-row problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub row: usize,
    pub severity: Severity,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn warning(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn rejected(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            severity: Severity::Rejected,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.row, self.message)
    }
}

/// Whether a record is a cash balance or a security holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Cash,
    Security,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Security => "security",
        }
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "security" => Ok(Self::Security),
            other => Err(format!("unknown record kind '{}'", other)),
        }
    }
}

/// A fully typed position row, ready for reference resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPositionRecord {
    pub account_number: String,
    pub account_name: String,
    /// Institution code
    pub institution: String,
    pub instrument_name: String,
    pub ticker: Option<String>,
    pub isin: Option<String>,
    /// 3-letter ISO code
    pub currency: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub as_of_date: NaiveDate,
    pub kind: RecordKind,
    /// Raw asset-class hint from the statement, if any
    pub asset_class: Option<String>,
    pub source: SourceRef,
}

/// How numbers are written in a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NumberFormat {
    /// Decimal separator taken from the value itself
    #[default]
    Auto,
    Decimal {
        decimal: char,
        thousands: Option<char>,
    },
}

impl NumberFormat {
    /// `1'234.56`
    pub const SWISS: Self = Self::Decimal {
        decimal: '.',
        thousands: Some('\''),
    };
    /// `1,234.56`
    pub const ENGLISH: Self = Self::Decimal {
        decimal: '.',
        thousands: Some(','),
    };
    /// `1.234,56`
    pub const CONTINENTAL: Self = Self::Decimal {
        decimal: ',',
        thousands: Some('.'),
    };
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Decimal {
                decimal,
                thousands: Some(t),
            } => write!(f, "1{}234{}56", t, decimal),
            Self::Decimal {
                decimal,
                thousands: None,
            } => write!(f, "1234{}56", decimal),
        }
    }
}

impl FromStr for NumberFormat {
    type Err = String;

    /// Accepts `auto` or a sample such as `1'234.56`, `1.234,56` or `1234,56`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let separators: Vec<char> = s.chars().filter(|c| !c.is_ascii_digit()).collect();
        match separators.as_slice() {
            [decimal] if matches!(decimal, '.' | ',') => Ok(Self::Decimal {
                decimal: *decimal,
                thousands: None,
            }),
            [thousands, decimal] if matches!(decimal, '.' | ',') && thousands != decimal => {
                Ok(Self::Decimal {
                    decimal: *decimal,
                    thousands: Some(*thousands),
                })
            }
            _ => Err(format!(
                "unrecognised number format '{}', expected 'auto' or a sample like 1'234.56",
                s
            )),
        }
    }
}

impl TryFrom<String> for NumberFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NumberFormat> for String {
    fn from(format: NumberFormat) -> Self {
        format.to_string()
    }
}
