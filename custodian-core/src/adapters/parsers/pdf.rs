//! PDF statement parser
//!
//! Custody PDFs are laid out as fixed-width tables. After text extraction a
//! table row is a line whose cells are separated by runs of two or more
//! spaces; single spaces stay inside a cell ("Nestle SA").

use std::sync::OnceLock;

use regex::Regex;

use super::columns::TableReader;
use crate::domain::ParseError;
use crate::ports::{NormalizeOptions, ParseOutput, StatementParser};

fn cell_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"\s{2,}|\t").expect("static pattern"))
}

#[derive(Debug, Default)]
pub struct PdfTableParser;

impl PdfTableParser {
    pub fn new() -> Self {
        Self
    }

    /// Split extracted text into table rows. Line numbers are 1-based lines
    /// of the extracted text.
    pub fn parse_text(&self, text: &str) -> Option<ParseOutput> {
        let mut table = TableReader::new(None).strict_width();
        for (index, line) in text.lines().enumerate() {
            let cells = cell_separator()
                .split(line.trim())
                .map(str::to_string)
                .collect();
            table.push(index + 1, cells);
        }
        table.finish()
    }
}

impl StatementParser for PdfTableParser {
    fn format(&self) -> &str {
        "pdf_table"
    }

    fn description(&self) -> &str {
        "PDF statement with a text table (columns split on wide gaps)"
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            date_formats: vec!["%d.%m.%Y".to_string(), "%d/%m/%Y".to_string()],
            ..NormalizeOptions::default()
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutput, ParseError> {
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ParseError::new(format!("unreadable PDF: {}", e)))?;
        if text.trim().is_empty() {
            return Err(ParseError::new("PDF contains no extractable text"));
        }
        self.parse_text(&text).ok_or_else(|| {
            ParseError::new("no table with a quantity and an instrument column found in PDF text")
        })
    }
}
