//! Statement format parsers and the registry that picks one per file

mod columns;
pub mod csv;
pub mod ibkr;
pub mod pdf;
pub mod spreadsheet;
mod text;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{Institution, ParseError};
use crate::ports::StatementParser;

pub use self::csv::DelimitedParser;
pub use ibkr::IbkrStatementParser;
pub use pdf::PdfTableParser;
pub use spreadsheet::SpreadsheetParser;
pub use text::decode_text;

/// Parsers keyed by format tag
pub struct ParserRegistry {
    parsers: BTreeMap<String, Arc<dyn StatementParser>>,
    /// Institution code -> tag, from settings
    institution_formats: HashMap<String, String>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: BTreeMap::new(),
            institution_formats: HashMap::new(),
        }
    }

    /// Registry with every built-in format
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DelimitedParser::generic()));
        registry.register(Arc::new(DelimitedParser::swiss_custody()));
        registry.register(Arc::new(IbkrStatementParser::new()));
        registry.register(Arc::new(SpreadsheetParser::new()));
        registry.register(Arc::new(PdfTableParser::new()));
        registry
    }

    /// Built-ins plus the parser profiles and institution defaults from settings
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::with_builtin();
        for (name, profile) in &config.parser_profiles {
            if registry.parsers.contains_key(name) {
                tracing::warn!(profile = %name, "parser profile shadows a built-in format");
            }
            registry.register(Arc::new(DelimitedParser::from_profile(name, profile)));
        }
        registry.institution_formats = config.institution_formats.clone();
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn StatementParser>) {
        self.parsers.insert(parser.format().to_string(), parser);
    }

    pub fn get(&self, format: &str) -> Result<Arc<dyn StatementParser>, ParseError> {
        self.parsers.get(format).cloned().ok_or_else(|| {
            ParseError::new(format!(
                "unknown format '{}' (known: {})",
                format,
                self.parsers.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// (tag, description) for every registered parser, sorted by tag
    pub fn formats(&self) -> Vec<(String, String)> {
        self.parsers
            .values()
            .map(|p| (p.format().to_string(), p.description().to_string()))
            .collect()
    }

    /// Pick the parser for a file: explicit tag, then the institution's
    /// default, then settings, then the file extension
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        institution: &Institution,
        file_name: &str,
    ) -> Result<Arc<dyn StatementParser>, ParseError> {
        let tag = explicit
            .map(str::to_string)
            .or_else(|| institution.default_format.clone())
            .or_else(|| self.institution_formats.get(&institution.code).cloned())
            .unwrap_or_else(|| format_for_extension(file_name).to_string());
        self.get(&tag)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

pub fn format_for_extension(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match extension.as_deref() {
        Some("xlsx" | "xls" | "xlsm" | "ods") => "xlsx",
        Some("pdf") => "pdf_table",
        _ => "csv",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserProfile;

    #[test]
    fn test_extension_fallback() {
        assert_eq!(format_for_extension("UBS_20241231.XLSX"), "xlsx");
        assert_eq!(format_for_extension("statement.pdf"), "pdf_table");
        assert_eq!(format_for_extension("export.txt"), "csv");
        assert_eq!(format_for_extension("no_extension"), "csv");
    }

    #[test]
    fn test_resolution_order() {
        let mut config = Config::default();
        config
            .parser_profiles
            .insert("zkb_csv".to_string(), ParserProfile::default());
        config
            .institution_formats
            .insert("ZKB".to_string(), "zkb_csv".to_string());
        let registry = ParserRegistry::from_config(&config);

        let ibkr = Institution::new("IBKR", "Interactive Brokers").with_default_format("ibkr_csv");
        let zkb = Institution::new("ZKB", "Zürcher Kantonalbank");
        let ubs = Institution::new("UBS", "UBS");

        assert_eq!(registry.resolve(Some("pdf_table"), &ibkr, "x.csv").unwrap().format(), "pdf_table");
        assert_eq!(registry.resolve(None, &ibkr, "x.csv").unwrap().format(), "ibkr_csv");
        assert_eq!(registry.resolve(None, &zkb, "x.pdf").unwrap().format(), "zkb_csv");
        assert_eq!(registry.resolve(None, &ubs, "x.pdf").unwrap().format(), "pdf_table");
    }

    #[test]
    fn test_unknown_tag() {
        let registry = ParserRegistry::with_builtin();
        let ubs = Institution::new("UBS", "UBS");
        let err = registry.resolve(Some("mt940"), &ubs, "x.sta").err().unwrap();
        assert!(err.message.contains("unknown format 'mt940'"));
        assert_eq!(registry.formats().len(), 5);
    }
}
