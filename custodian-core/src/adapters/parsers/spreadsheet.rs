//! Excel / OpenDocument statement parser
//!
//! The first worksheet that holds a recognisable header row is read. Row
//! numbers in diagnostics are 1-based sheet rows, as Excel shows them.

use std::io::Cursor;

use anyhow::anyhow;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate};

use super::columns::TableReader;
use crate::domain::ParseError;
use crate::ports::{NormalizeOptions, ParseOutput, StatementParser};

#[derive(Debug, Default)]
pub struct SpreadsheetParser;

impl SpreadsheetParser {
    pub fn new() -> Self {
        Self
    }
}

impl StatementParser for SpreadsheetParser {
    fn format(&self) -> &str {
        "xlsx"
    }

    fn description(&self) -> &str {
        "Excel or OpenDocument spreadsheet (first sheet with a header row)"
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            date_formats: vec!["%Y-%m-%d".to_string()],
            ..NormalizeOptions::default()
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutput, ParseError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| ParseError::new(format!("unreadable spreadsheet: {}", e)))?;

        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ParseError::new("spreadsheet has no worksheets"));
        }

        for name in &sheet_names {
            let range = match workbook.worksheet_range(name) {
                Ok(range) => range,
                Err(e) => {
                    tracing::debug!(sheet = %name, error = %e, "skipping unreadable worksheet");
                    continue;
                }
            };
            let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

            let mut table = TableReader::new(None).with_section(Some(name));
            for (index, row) in range.rows().enumerate() {
                table.push(first_row + index + 1, row.iter().map(cell_str).collect());
            }
            if let Some(output) = table.finish() {
                return Ok(output);
            }
        }

        Err(anyhow!(
            "no worksheet with a quantity and an instrument column found (sheets: {})",
            sheet_names.join(", ")
        )
        .into())
    }
}

/// Render a cell the way the normalizer expects text: dates as ISO, whole
/// numbers without a fractional part
fn cell_str(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => float_str(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.get(..10).unwrap_or(s).to_string(),
        Data::DurationIso(s) => s.clone(),
    }
}

fn float_str(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Excel serial day numbers count from 1899-12-30
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_rendering() {
        assert_eq!(cell_str(&Data::Float(1200.0)), "1200");
        assert_eq!(cell_str(&Data::Float(95.5)), "95.5");
        assert_eq!(cell_str(&Data::Int(-3)), "-3");
        assert_eq!(cell_str(&Data::String("Nestle SA".to_string())), "Nestle SA");
        assert_eq!(cell_str(&Data::Empty), "");
        assert_eq!(
            cell_str(&Data::DateTimeIso("2024-12-31T00:00:00".to_string())),
            "2024-12-31"
        );
    }

    #[test]
    fn test_serial_dates() {
        assert_eq!(serial_to_date(45657.0), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(serial_to_date(45657.75), NaiveDate::from_ymd_opt(2024, 12, 31));
    }

    #[test]
    fn test_not_a_spreadsheet() {
        let err = SpreadsheetParser::new()
            .parse(b"Description,Quantity\nNestle,10\n")
            .unwrap_err();
        assert!(err.message.contains("unreadable spreadsheet"));
    }
}
