//! Delimited-text statement parser
//!
//! Covers the generic `csv` format, the Swiss custody export and any parser
//! profile from settings. They differ only in delimiter, number/date
//! conventions and column mappings.

use anyhow::anyhow;

use super::columns::TableReader;
use super::text::decode_text;
use crate::config::{ColumnMappings, ParserProfile};
use crate::domain::{NumberFormat, ParseError};
use crate::ports::{NormalizeOptions, ParseOutput, StatementParser};

/// Delimiters tried, in order, when none is configured
const CANDIDATE_DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];

pub struct DelimitedParser {
    format: String,
    description: String,
    delimiter: Option<u8>,
    skip_rows: usize,
    mappings: Option<ColumnMappings>,
    options: NormalizeOptions,
}

impl DelimitedParser {
    /// Generic CSV: any common delimiter, headers found by alias
    pub fn generic() -> Self {
        Self {
            format: "csv".to_string(),
            description: "Delimited text with a recognisable header row".to_string(),
            delimiter: None,
            skip_rows: 0,
            mappings: None,
            options: NormalizeOptions::default(),
        }
    }

    /// Swiss private-bank custody export: semicolons, 1'234.56, dd.mm.yyyy,
    /// portfolio and valuation date in a preamble
    pub fn swiss_custody() -> Self {
        Self {
            format: "ch_custody_csv".to_string(),
            description: "Swiss custody statement (semicolon CSV with preamble)".to_string(),
            delimiter: Some(b';'),
            skip_rows: 0,
            mappings: None,
            options: NormalizeOptions {
                number_format: NumberFormat::SWISS,
                date_formats: vec!["%d.%m.%Y".to_string()],
                allow_negative_quantity: false,
            },
        }
    }

    pub fn from_profile(name: &str, profile: &ParserProfile) -> Self {
        let delimiter = profile
            .delimiter
            .filter(char::is_ascii)
            .map(|c| c as u8);
        Self {
            format: name.to_string(),
            description: profile
                .description
                .clone()
                .unwrap_or_else(|| format!("Custom CSV profile '{}'", name)),
            delimiter,
            skip_rows: profile.skip_rows,
            mappings: Some(profile.column_mappings.clone()),
            options: NormalizeOptions {
                number_format: profile.number_format,
                date_formats: profile.date_format.iter().cloned().collect(),
                allow_negative_quantity: profile.allow_short_positions,
            },
        }
    }

    fn parse_with(&self, text: &str, delimiter: u8) -> Option<ParseOutput> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut table = TableReader::new(self.mappings.as_ref());
        for (index, result) in reader.records().enumerate() {
            match result {
                Ok(record) => {
                    let line = record
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(index + 1);
                    if line <= self.skip_rows {
                        continue;
                    }
                    table.push(line, record.iter().map(str::to_string).collect());
                }
                Err(e) => {
                    let line = e
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(index + 1);
                    if table.has_header() {
                        table.reject(line, format!("unreadable row: {}", e));
                    }
                }
            }
        }
        table.finish()
    }
}

impl StatementParser for DelimitedParser {
    fn format(&self) -> &str {
        &self.format
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn normalize_options(&self) -> NormalizeOptions {
        self.options.clone()
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutput, ParseError> {
        let text = decode_text(bytes);
        if text.trim().is_empty() {
            return Err(ParseError::new("file is empty"));
        }

        let output = match self.delimiter {
            Some(delimiter) => self.parse_with(&text, delimiter),
            None => CANDIDATE_DELIMITERS
                .iter()
                .find_map(|&delimiter| self.parse_with(&text, delimiter)),
        };

        output.ok_or_else(|| {
            let tried = match self.delimiter {
                Some(d) => format!("'{}'", d as char),
                None => "',' ';' tab '|'".to_string(),
            };
            anyhow!(
                "no header row with a quantity and an instrument column found (delimiters tried: {})",
                tried
            )
            .into()
        })
    }
}
