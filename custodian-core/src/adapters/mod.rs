//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port
//! - Statement parsers (delimited text, IBKR activity CSV, spreadsheets, PDF)
//! - A channel-backed ResolutionPrompt for running imports on a worker thread
//! - Static FX rates from settings

pub mod channel_prompt;
pub mod duckdb;
pub mod parsers;
pub mod static_fx;
