//! Header detection and table assembly shared by the tabular parsers

use std::collections::HashMap;

use super::text::{is_blank, is_total_row};
use crate::config::ColumnMappings;
use crate::domain::{fields, ParseDiagnostic, RawRow};
use crate::ports::ParseOutput;

/// Header spellings seen in custody exports, per canonical field
const ALIASES: &[(&str, &[&str])] = &[
    (
        fields::ACCOUNT_NUMBER,
        &[
            "account number", "account no", "account", "portfolio", "portfolio number",
            "portfolio no", "depot", "depot number", "konto", "kontonummer", "compte",
        ],
    ),
    (
        fields::ACCOUNT_NAME,
        &["account name", "portfolio name", "depot name", "account holder"],
    ),
    (
        fields::INSTRUMENT,
        &[
            "instrument", "description", "security", "security name", "security description",
            "name", "designation", "bezeichnung", "titel", "title", "position name",
        ],
    ),
    (fields::TICKER, &["ticker", "symbol", "ticker symbol"]),
    (fields::ISIN, &["isin", "isin code"]),
    (
        fields::CURRENCY,
        &["currency", "ccy", "curr", "cur", "währung", "devise", "position currency"],
    ),
    (
        fields::QUANTITY,
        &[
            "quantity", "qty", "units", "nominal", "shares", "anzahl", "menge", "position",
            "balance",
        ],
    ),
    (
        fields::PRICE,
        &[
            "price", "last price", "market price", "close price", "closing price", "kurs",
            "cours", "unit price",
        ],
    ),
    (
        fields::AS_OF_DATE,
        &[
            "as of", "as of date", "as-of date", "date", "valuation date", "position date",
            "statement date", "stichtag", "datum",
        ],
    ),
    (
        fields::ASSET_CLASS,
        &["asset class", "asset category", "asset type", "category", "type", "anlagekategorie"],
    ),
];

/// Fields a preamble line ("Portfolio: 12345") may supply for every row
const PREAMBLE_FIELDS: &[&str] = &[
    fields::ACCOUNT_NUMBER,
    fields::ACCOUNT_NAME,
    fields::AS_OF_DATE,
    fields::CURRENCY,
];

/// Lowercase, collapse whitespace, drop trailing punctuation and "(...)" suffixes
pub(crate) fn normalize_header(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();
    if let Some(pos) = s.find('(') {
        if pos > 0 {
            s.truncate(pos);
        }
    }
    let s = s.trim().trim_end_matches([':', '.']).trim();
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn exact_alias(header: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&header))
        .map(|(field, _)| *field)
}

/// Column index per canonical field
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderMap {
    columns: HashMap<&'static str, usize>,
    width: usize,
}

impl HeaderMap {
    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

/// Try to read a row as a header. A header needs a quantity column and at
/// least one way to identify the instrument.
pub(crate) fn match_header(cells: &[String], mappings: Option<&ColumnMappings>) -> Option<HeaderMap> {
    let normalized: Vec<String> = cells.iter().map(|c| normalize_header(c)).collect();
    let mut columns: HashMap<&'static str, usize> = HashMap::new();
    let mut taken = vec![false; cells.len()];

    if let Some(mappings) = mappings {
        for (field, name) in mappings.explicit() {
            let wanted = normalize_header(name);
            if let Some(idx) = normalized.iter().position(|h| *h == wanted) {
                columns.insert(field, idx);
                taken[idx] = true;
            }
        }
    }

    for (idx, header) in normalized.iter().enumerate() {
        if taken[idx] {
            continue;
        }
        if let Some(field) = exact_alias(header) {
            if !columns.contains_key(field) {
                columns.insert(field, idx);
                taken[idx] = true;
            }
        }
    }

    // Looser pass: "Market price CHF" contains "market price"
    for (idx, header) in normalized.iter().enumerate() {
        if taken[idx] || header.is_empty() {
            continue;
        }
        let best = ALIASES
            .iter()
            .filter(|(field, _)| !columns.contains_key(field))
            .flat_map(|(field, aliases)| {
                aliases
                    .iter()
                    .filter(|alias| alias.len() >= 3 && contains_word(header, alias))
                    .map(move |alias| (*field, alias.len()))
            })
            .max_by_key(|(_, len)| *len);
        if let Some((field, _)) = best {
            columns.insert(field, idx);
            taken[idx] = true;
        }
    }

    let identifies_instrument = [fields::INSTRUMENT, fields::ISIN, fields::TICKER]
        .iter()
        .any(|f| columns.contains_key(f));
    if identifies_instrument && columns.contains_key(fields::QUANTITY) {
        Some(HeaderMap {
            columns,
            width: cells.len(),
        })
    } else {
        None
    }
}

/// Read "Key;Value" or "Key: Value" preamble lines into row defaults
fn preamble_entry(cells: &[String]) -> Option<(&'static str, String)> {
    let non_empty: Vec<&str> = cells
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    let (key, value) = match non_empty.as_slice() {
        [single] => {
            let (k, v) = single.split_once(':')?;
            (k.trim().to_string(), v.trim().to_string())
        }
        [key, value, ..] => (key.to_string(), value.to_string()),
        [] => return None,
    };
    if value.is_empty() {
        return None;
    }
    let field = exact_alias(&normalize_header(&key))?;
    PREAMBLE_FIELDS.contains(&field).then_some((field, value))
}

/// Assembles [`RawRow`]s from a stream of cell rows: finds the header,
/// collects preamble metadata, skips totals and prose, and reports rows it
/// cannot read.
pub(crate) struct TableReader<'a> {
    mappings: Option<&'a ColumnMappings>,
    header: Option<(HeaderMap, Vec<String>)>,
    defaults: Vec<(&'static str, String)>,
    section: Option<String>,
    /// Reject rows whose cell count differs from the header (PDF text)
    strict_width: bool,
    output: ParseOutput,
}

impl<'a> TableReader<'a> {
    pub fn new(mappings: Option<&'a ColumnMappings>) -> Self {
        Self {
            mappings,
            header: None,
            defaults: Vec::new(),
            section: None,
            strict_width: false,
            output: ParseOutput::default(),
        }
    }

    pub fn strict_width(mut self) -> Self {
        self.strict_width = true;
        self
    }

    pub fn with_section(mut self, section: Option<&str>) -> Self {
        self.section = section.map(str::to_string);
        self
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    pub fn reject(&mut self, line: usize, message: impl Into<String>) {
        self.output
            .diagnostics
            .push(ParseDiagnostic::rejected(line, message));
    }

    pub fn push(&mut self, line: usize, cells: Vec<String>) {
        let cells: Vec<String> = cells.into_iter().map(|c| c.trim().to_string()).collect();
        if is_blank(&cells) {
            return;
        }

        let Some((header, header_cells)) = &self.header else {
            match match_header(&cells, self.mappings) {
                Some(map) => {
                    let normalized = cells.iter().map(|c| normalize_header(c)).collect();
                    self.header = Some((map, normalized));
                }
                None => {
                    if let Some((field, value)) = preamble_entry(&cells) {
                        if !self.defaults.iter().any(|(f, _)| *f == field) {
                            self.defaults.push((field, value));
                        }
                    }
                }
            }
            return;
        };

        // Repeated header at a page break
        if cells
            .iter()
            .map(|c| normalize_header(c))
            .eq(header_cells.iter().cloned())
        {
            return;
        }

        let first = cells.iter().find(|c| !c.is_empty()).map(String::as_str).unwrap_or("");
        if is_total_row(first) {
            self.output
                .diagnostics
                .push(ParseDiagnostic::warning(line, format!("summary row '{}' skipped", first)));
            return;
        }
        if cells.iter().filter(|c| !c.is_empty()).count() == 1 {
            self.output
                .diagnostics
                .push(ParseDiagnostic::warning(line, format!("text line '{}' skipped", first)));
            return;
        }

        let quantity_idx = header.column(fields::QUANTITY).unwrap_or(0);
        let width_ok = if self.strict_width {
            cells.len() == header.width()
        } else {
            cells.len() > quantity_idx
        };
        if !width_ok {
            let message = format!(
                "expected {} columns, found {}",
                header.width(),
                cells.len()
            );
            self.reject(line, message);
            return;
        }

        let mut row = RawRow::new(line).with_section(self.section.as_deref());
        for field in fields::ALL {
            if let Some(value) = header.column(field).and_then(|idx| cells.get(idx)) {
                row.set(field, value);
            }
        }
        for (field, value) in &self.defaults {
            row.set_default(field, value);
        }
        self.output.rows.push(row);
    }

    /// `None` when no header row was ever found
    pub fn finish(self) -> Option<ParseOutput> {
        self.header.map(|_| self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_aliases() {
        let header = match_header(
            &cells(&["Portfolio", "Description", "ISIN", "Ccy", "Quantity", "Market price (CHF)", "Valuation date"]),
            None,
        )
        .unwrap();
        assert_eq!(header.column(fields::ACCOUNT_NUMBER), Some(0));
        assert_eq!(header.column(fields::INSTRUMENT), Some(1));
        assert_eq!(header.column(fields::ISIN), Some(2));
        assert_eq!(header.column(fields::CURRENCY), Some(3));
        assert_eq!(header.column(fields::QUANTITY), Some(4));
        assert_eq!(header.column(fields::PRICE), Some(5));
        assert_eq!(header.column(fields::AS_OF_DATE), Some(6));
    }

    #[test]
    fn test_account_name_not_confused_with_number() {
        let header = match_header(
            &cells(&["Account Name", "Account Number", "Symbol", "Shares"]),
            None,
        )
        .unwrap();
        assert_eq!(header.column(fields::ACCOUNT_NAME), Some(0));
        assert_eq!(header.column(fields::ACCOUNT_NUMBER), Some(1));
        assert_eq!(header.column(fields::TICKER), Some(2));
    }

    #[test]
    fn test_not_a_header() {
        assert!(match_header(&cells(&["Portfolio", "12345-01"]), None).is_none());
        assert!(match_header(&cells(&["Nestle SA", "CH0038863350", "100"]), None).is_none());
    }

    #[test]
    fn test_explicit_mappings_win() {
        let mappings = ColumnMappings {
            quantity: Some("Stk.".to_string()),
            instrument: Some("Wertpapier".to_string()),
            ..Default::default()
        };
        let header = match_header(&cells(&["Wertpapier", "Stk.", "Währung"]), Some(&mappings)).unwrap();
        assert_eq!(header.column(fields::INSTRUMENT), Some(0));
        assert_eq!(header.column(fields::QUANTITY), Some(1));
        assert_eq!(header.column(fields::CURRENCY), Some(2));
    }

    #[test]
    fn test_table_reader_preamble_and_totals() {
        let mut reader = TableReader::new(None);
        reader.push(1, cells(&["Portfolio", "0233-123456.01"]));
        reader.push(2, cells(&["Valuation date: 31.12.2024"]));
        reader.push(3, cells(&[]));
        reader.push(4, cells(&["Description", "ISIN", "Currency", "Quantity"]));
        reader.push(5, cells(&["Nestle SA", "CH0038863350", "CHF", "100"]));
        reader.push(6, cells(&["Total", "", "", "100"]));
        reader.push(7, cells(&["Roche"]));
        let output = reader.finish().unwrap();

        assert_eq!(output.rows.len(), 1);
        let row = &output.rows[0];
        assert_eq!(row.get(fields::ACCOUNT_NUMBER), Some("0233-123456.01"));
        assert_eq!(row.get(fields::AS_OF_DATE), Some("31.12.2024"));
        assert_eq!(row.source.line, 5);
        assert_eq!(output.warnings().count(), 2);
        assert_eq!(output.rejected().count(), 0);
    }

    #[test]
    fn test_short_rows_rejected() {
        let mut reader = TableReader::new(None);
        reader.push(1, cells(&["Description", "Currency", "Quantity"]));
        reader.push(2, cells(&["Nestle SA", "CHF"]));
        let output = reader.finish().unwrap();
        assert!(output.rows.is_empty());
        assert_eq!(output.rejected().count(), 1);
        assert_eq!(output.total_rows(), 1);
    }

    #[test]
    fn test_no_header_found() {
        let mut reader = TableReader::new(None);
        reader.push(1, cells(&["just", "some", "text"]));
        assert!(reader.finish().is_none());
    }
}
