//! Row normalizer - coerces raw parser rows into typed position records

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::domain::{
    fields, Account, NumberFormat, ParsedPositionRecord, RawRow, RecordKind, ValidationError,
};
use crate::ports::NormalizeOptions;

/// Date formats tried after the parser's preferred ones
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y%m%d",
    "%d-%m-%Y",
    "%d.%m.%y",
];

/// Normalizes rows for one institution with one parser's conventions
pub struct RowNormalizer {
    institution: String,
    options: NormalizeOptions,
}

impl RowNormalizer {
    pub fn new(institution_code: impl Into<String>, options: NormalizeOptions) -> Self {
        Self {
            institution: institution_code.into(),
            options,
        }
    }

    pub fn normalize(&self, row: &RawRow) -> Result<ParsedPositionRecord, ValidationError> {
        let line = row.source.line;

        let account_number = row
            .get(fields::ACCOUNT_NUMBER)
            .map(Account::normalize_number)
            .ok_or_else(|| ValidationError::missing(line, fields::ACCOUNT_NUMBER))?;

        let ticker = row.get(fields::TICKER).and_then(normalize_ticker);
        let isin = match row.get(fields::ISIN) {
            Some(raw) => Some(
                normalize_isin(raw)
                    .map_err(|reason| ValidationError::invalid(line, fields::ISIN, raw, reason))?,
            ),
            None => None,
        };

        let instrument_name = row
            .get(fields::INSTRUMENT)
            .map(str::to_string)
            .or_else(|| ticker.clone())
            .or_else(|| isin.clone())
            .ok_or_else(|| ValidationError::missing(line, fields::INSTRUMENT))?;

        let currency_raw = row
            .get(fields::CURRENCY)
            .ok_or_else(|| ValidationError::missing(line, fields::CURRENCY))?;
        let currency = normalize_currency(currency_raw).ok_or_else(|| {
            ValidationError::invalid(line, fields::CURRENCY, currency_raw, "not a 3-letter ISO code")
        })?;

        let quantity_raw = row
            .get(fields::QUANTITY)
            .ok_or_else(|| ValidationError::missing(line, fields::QUANTITY))?;
        let quantity = parse_decimal(quantity_raw, self.options.number_format).ok_or_else(|| {
            ValidationError::invalid(line, fields::QUANTITY, quantity_raw, "not a number")
        })?;
        if quantity.is_sign_negative() && !quantity.is_zero() && !self.options.allow_negative_quantity
        {
            return Err(ValidationError::invalid(
                line,
                fields::QUANTITY,
                quantity_raw,
                "short positions are not allowed for this format",
            ));
        }

        let price = match row.get(fields::PRICE) {
            Some(raw) => {
                let price = parse_decimal(raw, self.options.number_format).ok_or_else(|| {
                    ValidationError::invalid(line, fields::PRICE, raw, "not a number")
                })?;
                if price.is_sign_negative() && !price.is_zero() {
                    return Err(ValidationError::invalid(
                        line,
                        fields::PRICE,
                        raw,
                        "price cannot be negative",
                    ));
                }
                Some(price)
            }
            None => None,
        };

        let date_raw = row
            .get(fields::AS_OF_DATE)
            .ok_or_else(|| ValidationError::missing(line, fields::AS_OF_DATE))?;
        let as_of_date = parse_date(date_raw, &self.options.date_formats).ok_or_else(|| {
            ValidationError::invalid(line, fields::AS_OF_DATE, date_raw, "unrecognised date")
        })?;

        let account_name = row
            .get(fields::ACCOUNT_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| account_number.clone());
        let asset_class = row.get(fields::ASSET_CLASS).map(str::to_string);
        let kind = classify(
            asset_class.as_deref(),
            &instrument_name,
            &currency,
            ticker.is_some() || isin.is_some(),
        );

        Ok(ParsedPositionRecord {
            account_number,
            account_name,
            institution: self.institution.clone(),
            instrument_name,
            ticker,
            isin,
            currency,
            quantity: quantity.normalize(),
            price: price.map(|p| p.normalize()),
            as_of_date,
            kind,
            asset_class,
            source: row.source.clone(),
        })
    }
}

/// Map a currency code, symbol or common alias to an ISO code
pub fn normalize_currency(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let code = match upper.as_str() {
        "€" => "EUR",
        "$" | "US$" => "USD",
        "£" => "GBP",
        "¥" => "JPY",
        "SFR" | "SFR." | "FR" | "FR." => "CHF",
        s if s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase()) => s,
        _ => return None,
    };
    Some(code.to_string())
}

pub fn normalize_ticker(raw: &str) -> Option<String> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        None
    } else {
        Some(ticker)
    }
}

/// Strip spaces, uppercase, and validate shape plus check digit
pub fn normalize_isin(raw: &str) -> Result<String, &'static str> {
    let isin: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let bytes = isin.as_bytes();
    if bytes.len() != 12 {
        return Err("ISIN must be 12 characters");
    }
    if !bytes[..2].iter().all(u8::is_ascii_uppercase) {
        return Err("ISIN must start with a 2-letter country code");
    }
    if !bytes[2..11]
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return Err("ISIN body must be alphanumeric");
    }
    if !bytes[11].is_ascii_digit() {
        return Err("ISIN check digit must be numeric");
    }
    if !isin_checksum_valid(&isin) {
        return Err("ISIN check digit does not match");
    }
    Ok(isin)
}

/// Letters expand to two digits (A=10 .. Z=35), then Luhn over the digit string
fn isin_checksum_valid(isin: &str) -> bool {
    let mut digits = Vec::with_capacity(24);
    for c in isin.chars() {
        match c.to_digit(36) {
            Some(d) if d >= 10 => {
                digits.push(d / 10);
                digits.push(d % 10);
            }
            Some(d) => digits.push(d),
            None => return false,
        }
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Parse a locale-formatted number.
///
/// Handles `(1'234.50)`, `1.234,50-`, `CHF 1 234.50` and the like. Anything
/// that is not a digit, separator, sign or a leading/trailing currency marker
/// makes the value invalid.
pub fn parse_decimal(raw: &str, format: NumberFormat) -> Option<Decimal> {
    let mut s = strip_currency(raw.trim());
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = strip_currency(inner.trim());
    }

    let mut body = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '0'..='9' | '.' | ',' | '-' | '+' => body.push(c),
            '\u{2212}' => body.push('-'),
            '\'' | '\u{2019}' | ' ' | '\u{a0}' | '\u{202f}' => {}
            _ => return None,
        }
    }

    let mut body = body.as_str();
    if let Some(rest) = body.strip_prefix('-') {
        negative = true;
        body = rest;
    } else if let Some(rest) = body.strip_suffix('-') {
        negative = true;
        body = rest;
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest;
    }
    if body.contains(|c| c == '-' || c == '+') || !body.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let plain = match format {
        NumberFormat::Auto => auto_separators(body)?,
        NumberFormat::Decimal { decimal, thousands } => {
            let mut out = String::with_capacity(body.len());
            for c in body.chars() {
                if Some(c) == thousands {
                    continue;
                } else if c == decimal {
                    out.push('.');
                } else if c == '.' || c == ',' {
                    return None;
                } else {
                    out.push(c);
                }
            }
            out
        }
    };

    let value = Decimal::from_str(&plain).ok()?;
    Some(if negative { -value } else { value })
}

/// Decide which of `.`/`,` is the decimal separator from the value itself.
///
/// The other one may only group the integer part in threes; a grouping
/// separator after the decimal one, or an uneven group, rejects the value.
fn auto_separators(body: &str) -> Option<String> {
    let decimal = match body.rfind(|c| c == '.' || c == ',') {
        None => None,
        Some(pos) => {
            let sep = if body[pos..].starts_with('.') { '.' } else { ',' };
            let other = if sep == '.' { ',' } else { '.' };
            let digits_after = body.len() - pos - 1;
            if body.contains(other) {
                Some(sep)
            } else if body.matches(sep).count() > 1 {
                None
            } else if sep == ',' && digits_after == 3 {
                None
            } else {
                Some(sep)
            }
        }
    };

    let (int_part, frac_part) = match decimal {
        Some(sep) => {
            let (int_part, frac_part) = body.rsplit_once(sep)?;
            if frac_part.contains(['.', ',']) || int_part.contains(sep) {
                return None;
            }
            (int_part, Some(frac_part))
        }
        None => (body, None),
    };

    let mut groups = int_part.split(['.', ',']);
    let first = groups.next().unwrap_or_default();
    let mut plain = first.to_string();
    let mut grouped = false;
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        plain.push_str(group);
        grouped = true;
    }
    if grouped && !(1..=3).contains(&first.len()) {
        return None;
    }
    if let Some(frac) = frac_part {
        plain.push('.');
        plain.push_str(frac);
    }
    Some(plain)
}

fn strip_currency(s: &str) -> &str {
    let s = s
        .trim_matches(|c| matches!(c, '$' | '€' | '£' | '¥'))
        .trim();
    let is_code = |t: &str| t.len() == 3 && t.chars().all(|c| c.is_ascii_uppercase());
    if let Some((head, tail)) = s.split_once(char::is_whitespace) {
        if is_code(head) {
            return tail.trim();
        }
    }
    if let Some((head, tail)) = s.rsplit_once(char::is_whitespace) {
        if is_code(tail) {
            return head.trim();
        }
    }
    s
}

/// Parse a statement date. A trailing time component is ignored.
pub fn parse_date(raw: &str, preferred: &[String]) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_only = trimmed
        .split(|c: char| c == 'T' || c.is_whitespace())
        .next()
        .unwrap_or(trimmed);

    let formats = preferred
        .iter()
        .map(String::as_str)
        .chain(DATE_FORMATS.iter().copied());
    for candidate in [trimmed, date_only] {
        for fmt in formats.clone() {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, fmt) {
                // `%Y` happily reads "24" as year 24
                if (1900..=2200).contains(&date.year()) {
                    return Some(date);
                }
            }
        }
    }
    None
}

/// Words that may make up a cash line's description besides its currency
const CASH_WORDS: &[&str] = &[
    "cash",
    "liquidity",
    "account",
    "balance",
    "current",
    "konto",
    "kontokorrent",
    "guthaben",
];

fn classify(
    asset_class: Option<&str>,
    instrument_name: &str,
    currency: &str,
    has_identifier: bool,
) -> RecordKind {
    if let Some(hint) = asset_class {
        let hint = hint.to_lowercase();
        if hint.contains("cash") || hint.contains("liquid") {
            return RecordKind::Cash;
        }
    }
    if !has_identifier && is_cash_name(instrument_name, currency) {
        return RecordKind::Cash;
    }
    RecordKind::Security
}

/// "CHF", "Cash CHF", "Cash account": every word is a cash word or the row's own currency
fn is_cash_name(name: &str, currency: &str) -> bool {
    let mut words = name
        .split(|c: char| !c.is_alphanumeric() && !matches!(c, '$' | '€' | '£' | '¥'))
        .filter(|w| !w.is_empty())
        .peekable();
    if words.peek().is_none() {
        return false;
    }
    words.all(|word| {
        CASH_WORDS.contains(&word.to_lowercase().as_str())
            || normalize_currency(word).as_deref() == Some(currency)
    })
}
