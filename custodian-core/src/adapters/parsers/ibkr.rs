//! Interactive Brokers activity statement parser
//!
//! The statement is one CSV file holding many sections. Every line starts with
//! the section name and a row kind (`Header`, `Data`, `Total`, ...). Positions
//! come from `Open Positions`, their ISINs from `Financial Instrument
//! Information` (which appears later in the file) and cash balances from the
//! `Cash Report`.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use super::text::decode_text;
use crate::domain::{fields, NumberFormat, ParseDiagnostic, ParseError, RawRow};
use crate::ports::{NormalizeOptions, ParseOutput, StatementParser};

const OPEN_POSITIONS: &str = "Open Positions";
const INSTRUMENT_INFO: &str = "Financial Instrument Information";
const CASH_REPORT: &str = "Cash Report";

#[derive(Debug, Clone)]
struct SectionHeader {
    idx: HashMap<String, usize>,
}

impl SectionHeader {
    fn new(cols: &[String]) -> Self {
        let idx = cols
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.trim().is_empty())
            .map(|(i, c)| (c.trim().to_string(), i))
            .collect();
        Self { idx }
    }

    fn get<'a>(&self, row: &'a [String], col: &str) -> Option<&'a str> {
        let i = *self.idx.get(col)?;
        row.get(i).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    fn requires(&self, row: &[String], col: &str) -> bool {
        self.idx.get(col).is_some_and(|&i| i < row.len())
    }
}

#[derive(Debug, Default)]
struct InstrumentInfo {
    description: Option<String>,
    security_id: Option<String>,
}

/// A position or cash line waiting for the statement-wide metadata
struct PendingRow {
    line: usize,
    section: &'static str,
    asset_category: Option<String>,
    symbol: Option<String>,
    currency: Option<String>,
    quantity: Option<String>,
    price: Option<String>,
}

#[derive(Debug, Default)]
pub struct IbkrStatementParser;

impl IbkrStatementParser {
    pub fn new() -> Self {
        Self
    }

    fn read(&self, bytes: &[u8]) -> Result<ParseOutput> {
        let text = decode_text(bytes);
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut headers: HashMap<String, SectionHeader> = HashMap::new();
        let mut statement_end: Option<NaiveDate> = None;
        let mut account_number: Option<String> = None;
        let mut account_name: Option<String> = None;
        let mut instruments: HashMap<String, InstrumentInfo> = HashMap::new();
        let mut pending: Vec<PendingRow> = Vec::new();
        let mut output = ParseOutput::default();
        let mut saw_positions = false;

        for (index, rec) in reader.records().enumerate() {
            let rec = match rec {
                Ok(rec) => rec,
                Err(e) => {
                    let line = e.position().map(|p| p.line() as usize).unwrap_or(index + 1);
                    output
                        .diagnostics
                        .push(ParseDiagnostic::rejected(line, format!("unreadable row: {}", e)));
                    continue;
                }
            };
            let line = rec.position().map(|p| p.line() as usize).unwrap_or(index + 1);
            if rec.len() < 2 {
                continue;
            }

            let section = rec.get(0).unwrap_or("").trim();
            let row_kind = rec.get(1).unwrap_or("").trim();
            let row: Vec<String> = rec.iter().skip(2).map(str::to_string).collect();

            if row_kind == "Header" {
                headers.insert(section.to_string(), SectionHeader::new(&row));
                if section == OPEN_POSITIONS || section == CASH_REPORT {
                    saw_positions = true;
                }
                continue;
            }
            if row_kind != "Data" {
                continue;
            }

            match section {
                "Statement" => {
                    let field = row.first().map(|s| s.trim()).unwrap_or("");
                    let value = row.get(1).map(|s| s.trim()).unwrap_or("");
                    if field.eq_ignore_ascii_case("period") {
                        statement_end = parse_statement_end(value).or(statement_end);
                    } else if field.eq_ignore_ascii_case("whengenerated") && statement_end.is_none() {
                        statement_end = value.get(..10).and_then(|d| {
                            NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()
                        });
                    }
                }
                "Account Information" => {
                    let field = row.first().map(|s| s.trim()).unwrap_or("");
                    let value = row.get(1).map(|s| s.trim().to_string()).filter(|v| !v.is_empty());
                    match field {
                        "Account" => account_number = value,
                        "Name" => account_name = value,
                        _ => {}
                    }
                }
                INSTRUMENT_INFO => {
                    let h = headers
                        .get(section)
                        .ok_or_else(|| anyhow!("missing header for section {}", section))?;
                    if let Some(symbol) = h.get(&row, "Symbol").map(primary_symbol) {
                        instruments.insert(
                            symbol,
                            InstrumentInfo {
                                description: h.get(&row, "Description").map(str::to_string),
                                security_id: h.get(&row, "Security ID").map(str::to_string),
                            },
                        );
                    }
                }
                OPEN_POSITIONS => {
                    let h = headers
                        .get(section)
                        .ok_or_else(|| anyhow!("missing header for section {}", section))?;
                    // Lot rows repeat the summary row per tax lot
                    if h.get(&row, "DataDiscriminator").is_some_and(|d| d != "Summary") {
                        continue;
                    }
                    if !h.requires(&row, "Quantity") {
                        output.diagnostics.push(ParseDiagnostic::rejected(
                            line,
                            "open position row is shorter than its header",
                        ));
                        continue;
                    }
                    pending.push(PendingRow {
                        line,
                        section: OPEN_POSITIONS,
                        asset_category: h.get(&row, "Asset Category").map(str::to_string),
                        symbol: h.get(&row, "Symbol").map(primary_symbol),
                        currency: h.get(&row, "Currency").map(str::to_string),
                        quantity: h.get(&row, "Quantity").map(str::to_string),
                        price: h.get(&row, "Close Price").map(str::to_string),
                    });
                }
                CASH_REPORT => {
                    let h = headers
                        .get(section)
                        .ok_or_else(|| anyhow!("missing header for section {}", section))?;
                    let summary = h.get(&row, "Currency Summary").unwrap_or("");
                    let currency = h.get(&row, "Currency").unwrap_or("");
                    if summary != "Ending Cash" || currency.is_empty() || currency.contains("Base Currency") {
                        continue;
                    }
                    pending.push(PendingRow {
                        line,
                        section: CASH_REPORT,
                        asset_category: Some("Cash".to_string()),
                        symbol: None,
                        currency: Some(currency.to_string()),
                        quantity: h.get(&row, "Total").map(str::to_string),
                        price: None,
                    });
                }
                _ => {}
            }
        }

        if !saw_positions {
            return Err(anyhow!(
                "not an Interactive Brokers activity statement (no Open Positions or Cash Report section)"
            ));
        }

        let as_of = statement_end.map(|d| d.format("%Y-%m-%d").to_string());
        for p in pending {
            let mut row = RawRow::new(p.line).with_section(Some(p.section));
            if let Some(account) = &account_number {
                row.set(fields::ACCOUNT_NUMBER, account);
            }
            if let Some(name) = &account_name {
                row.set(fields::ACCOUNT_NAME, name);
            }
            if let Some(date) = &as_of {
                row.set(fields::AS_OF_DATE, date);
            }
            match &p.symbol {
                Some(symbol) => {
                    row.set(fields::TICKER, symbol);
                    if let Some(info) = instruments.get(symbol) {
                        if let Some(description) = &info.description {
                            row.set(fields::INSTRUMENT, description);
                        }
                        // Security ID is an ISIN for most listings, a CUSIP for some
                        if let Some(id) = info.security_id.as_deref().filter(|id| id.len() == 12) {
                            row.set(fields::ISIN, id);
                        }
                    }
                }
                None => {
                    if let Some(currency) = &p.currency {
                        row.set(fields::INSTRUMENT, &format!("Cash {}", currency));
                    }
                }
            }
            if let Some(v) = &p.asset_category {
                row.set(fields::ASSET_CLASS, v);
            }
            if let Some(v) = &p.currency {
                row.set(fields::CURRENCY, v);
            }
            if let Some(v) = &p.quantity {
                row.set(fields::QUANTITY, v);
            }
            if let Some(v) = &p.price {
                row.set(fields::PRICE, v);
            }
            output.rows.push(row);
        }

        Ok(output)
    }
}

impl StatementParser for IbkrStatementParser {
    fn format(&self) -> &str {
        "ibkr_csv"
    }

    fn description(&self) -> &str {
        "Interactive Brokers activity statement (multi-section CSV)"
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            number_format: NumberFormat::ENGLISH,
            date_formats: vec!["%Y-%m-%d".to_string()],
            allow_negative_quantity: true,
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParseOutput, ParseError> {
        self.read(bytes).map_err(ParseError::from)
    }
}

/// "January 1, 2024 - December 31, 2024" -> 2024-12-31
fn parse_statement_end(period: &str) -> Option<NaiveDate> {
    let normalized = period.trim().trim_matches('"').replace(['–', '—'], "-");
    let end = normalized
        .split_once(" - ")
        .map(|(_, end)| end)
        .unwrap_or(&normalized)
        .trim();
    NaiveDate::parse_from_str(end, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(end, "%Y-%m-%d"))
        .ok()
}

/// "AAPL, AAPL.OLD" lists aliases; the first is the live symbol
fn primary_symbol(symbol: &str) -> String {
    symbol
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(symbol)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT: &str = "\
Statement,Header,Field Name,Field Value
Statement,Data,BrokerName,Interactive Brokers LLC
Statement,Data,Period,\"January 1, 2024 - December 31, 2024\"
Account Information,Header,Field Name,Field Value
Account Information,Data,Name,Jane Doe
Account Information,Data,Account,U1234567
Open Positions,Header,DataDiscriminator,Asset Category,Currency,Symbol,Quantity,Mult,Cost Price,Cost Basis,Close Price,Value,Unrealized P/L,Code
Open Positions,Data,Summary,Stocks,USD,AAPL,10,1,150,1500,190.5,1905,405,
Open Positions,Data,Lot,Stocks,USD,AAPL,10,1,150,1500,190.5,1905,405,
Open Positions,Data,Summary,Stocks,USD,TSLA,-5,1,250,-1250,400,-2000,-750,
Open Positions,Total,,Stocks,USD,,,,,250,,-95,-345,
Open Positions,Data,Summary,Stocks
Financial Instrument Information,Header,Asset Category,Symbol,Description,Conid,Security ID,Listing Exch,Multiplier,Type,Code
Financial Instrument Information,Data,Stocks,AAPL,APPLE INC,265598,US0378331005,NASDAQ,1,COMMON,
Cash Report,Header,Currency Summary,Currency,Total,Securities,Futures,Month to Date,Year to Date,
Cash Report,Data,Starting Cash,Base Currency Summary,900,900,0,,,
Cash Report,Data,Ending Cash,Base Currency Summary,1000.5,1000.5,0,,,
Cash Report,Data,Ending Cash,USD,\"1,000.50\",1000.5,0,,,
";

    #[test]
    fn test_parse_activity_statement() {
        let output = IbkrStatementParser::new().parse(STATEMENT.as_bytes()).unwrap();
        assert_eq!(output.rows.len(), 3);
        assert_eq!(output.rejected().count(), 1);

        let aapl = &output.rows[0];
        assert_eq!(aapl.get(fields::ACCOUNT_NUMBER), Some("U1234567"));
        assert_eq!(aapl.get(fields::ACCOUNT_NAME), Some("Jane Doe"));
        assert_eq!(aapl.get(fields::AS_OF_DATE), Some("2024-12-31"));
        assert_eq!(aapl.get(fields::INSTRUMENT), Some("APPLE INC"));
        assert_eq!(aapl.get(fields::ISIN), Some("US0378331005"));
        assert_eq!(aapl.get(fields::PRICE), Some("190.5"));
        assert_eq!(aapl.source.section.as_deref(), Some("Open Positions"));

        let tsla = &output.rows[1];
        assert_eq!(tsla.get(fields::TICKER), Some("TSLA"));
        assert_eq!(tsla.get(fields::QUANTITY), Some("-5"));
        assert_eq!(tsla.get(fields::INSTRUMENT), None);

        let cash = &output.rows[2];
        assert_eq!(cash.get(fields::INSTRUMENT), Some("Cash USD"));
        assert_eq!(cash.get(fields::QUANTITY), Some("1,000.50"));
        assert_eq!(cash.get(fields::ASSET_CLASS), Some("Cash"));
    }

    #[test]
    fn test_not_an_ibkr_statement() {
        let err = IbkrStatementParser::new()
            .parse(b"Description,Quantity\nNestle,10\n")
            .unwrap_err();
        assert!(err.message.contains("not an Interactive Brokers"));
    }

    #[test]
    fn test_statement_period() {
        assert_eq!(
            parse_statement_end("\"December 1, 2025 - January 30, 2026\""),
            NaiveDate::from_ymd_opt(2026, 1, 30)
        );
        assert_eq!(primary_symbol("AAPL, AAPL.OLD"), "AAPL");
    }
}
