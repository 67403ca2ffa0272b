//! CLI command implementations

pub mod accounts;
pub mod delete;
pub mod formats;
pub mod fx;
pub mod import;
pub mod institutions;
pub mod instruments;
pub mod logs;
pub mod positions;
pub mod prompt;
pub mod report;
pub mod sessions;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use custodian_core::{CustodianContext, EntryPoint};

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CUSTODIAN_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".custodian"))
        .context("Could not find home directory; set CUSTODIAN_DIR")
}

/// Open the store and wire the services
pub fn get_context() -> Result<CustodianContext> {
    let data_dir = get_data_dir()?;
    CustodianContext::new(&data_dir, EntryPoint::Cli)
        .with_context(|| format!("Failed to open custodian data in {}", data_dir.display()))
}

/// Record which command ran; logging never breaks the command itself
pub fn log_command(ctx: &CustodianContext, command: &str) {
    if let Some(logger) = &ctx.logging_service {
        if let Err(e) = logger.log_command(command) {
            tracing::debug!(error = %e, "could not log command");
        }
    }
}

/// Parse an `--account-type` value
pub fn parse_account_type(value: Option<&str>) -> Result<Option<custodian_core::AccountType>> {
    value
        .map(|v| v.parse().map_err(anyhow::Error::msg))
        .transpose()
}
