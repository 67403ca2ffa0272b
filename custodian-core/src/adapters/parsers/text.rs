//! Text decoding helpers shared by the text-based parsers

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};

/// Decode statement bytes to a string.
///
/// BOMs are honoured and stripped. Bytes that are not valid UTF-8 are read as
/// Windows-1252, which is what most bank exports use when they are not UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let (decoded, _) = UTF_16LE.decode_without_bom_handling(rest);
        return decoded.into_owned();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let (decoded, _) = UTF_16BE.decode_without_bom_handling(rest);
        return decoded.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Rows like "Total", "Subtotal CHF" or "Grand total" are summaries, not positions
pub fn is_total_row(first_cell: &str) -> bool {
    let lower = first_cell.trim().to_lowercase();
    ["total", "subtotal", "sub-total", "grand total", "summe"]
        .iter()
        .any(|prefix| match lower.strip_prefix(prefix) {
            Some(rest) => !rest.starts_with(|c: char| c.is_alphanumeric()),
            None => false,
        })
}

pub fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_bom_stripped() {
        let bytes = b"\xEF\xBB\xBFISIN;Quantity\n";
        assert_eq!(decode_text(bytes), "ISIN;Quantity\n");
    }

    #[test]
    fn test_utf16le_bom() {
        let bytes = [0xFF, 0xFE, b'I', 0, b'S', 0, b'I', 0, b'N', 0];
        assert_eq!(decode_text(&bytes), "ISIN");
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "Währung" with 0xE4 for 'ä'
        let bytes = b"W\xE4hrung";
        assert_eq!(decode_text(bytes), "Währung");
    }

    #[test]
    fn test_total_rows() {
        assert!(is_total_row("Total CHF"));
        assert!(is_total_row("  subtotal equities"));
        assert!(!is_total_row("TotalEnergies SE"));
    }
}
