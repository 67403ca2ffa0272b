//! Logs command - the import log in logs.duckdb

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use super::get_data_dir;
use crate::output;
use custodian_core::{EntryPoint, LogEntry, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// One line per finished import
    Imports {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Recent events as a table
    List {
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only events that carry an error
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete events older than N days
    Clear {
        #[arg(long, default_value = "30")]
        older_than_days: i64,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Copy the log database to a file
    Export { output: PathBuf },
    /// Entry count and database location
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn open() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn time(entry: &LogEntry) -> String {
    Utc.timestamp_millis_opt(entry.timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.timestamp.to_string())
}

fn rows(entry: &LogEntry) -> String {
    match (entry.parsed_rows, entry.failed_rows) {
        (Some(parsed), Some(failed)) => format!("{} / {}", parsed, failed),
        _ => String::new(),
    }
}

pub fn run(command: LogsCommands) -> Result<()> {
    let logs = open()?;
    match command {
        LogsCommands::Imports { limit } => {
            let lines = logs.import_log_lines(limit)?;
            if lines.is_empty() {
                println!("No imports logged.");
            }
            // Oldest first, like a log file
            for line in lines.iter().rev() {
                println!("{}", line);
            }
        }
        LogsCommands::List {
            limit,
            errors,
            json,
        } => {
            let entries = if errors {
                logs.get_errors(limit)?
            } else {
                logs.get_recent(limit)?
            };
            if json {
                return output::json(&entries);
            }
            if entries.is_empty() {
                println!("No log entries found.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Event", "File", "Saved / failed", "Error"]);
            for entry in &entries {
                let event = match entry.error_message {
                    Some(_) => entry.event.red().to_string(),
                    None => entry.event.clone(),
                };
                table.add_row(vec![
                    time(entry),
                    event,
                    entry
                        .file_name
                        .clone()
                        .or_else(|| entry.command.clone())
                        .unwrap_or_default(),
                    rows(entry),
                    entry.error_message.clone().unwrap_or_default(),
                ]);
            }
            println!("{}", table);
        }
        LogsCommands::Clear {
            older_than_days,
            force,
        } => {
            let cutoff = Utc::now() - Duration::days(older_than_days);
            if !force
                && !Confirm::new()
                    .with_prompt(format!("Delete log events before {}?", cutoff.format("%Y-%m-%d")))
                    .default(false)
                    .interact()?
            {
                println!("Cancelled.");
                return Ok(());
            }
            let deleted = logs.delete_before(cutoff.timestamp_millis())?;
            output::success(&format!("Deleted {} log events", deleted));
        }
        LogsCommands::Export { output: path } => {
            let written = logs.export(&path)?;
            output::success(&format!("Logs exported to {}", written.display()));
        }
        LogsCommands::Stats { json } => {
            let total = logs.count()?;
            let path = logs.db_path().display().to_string();
            if json {
                return output::json(&serde_json::json!({ "entries": total, "path": path }));
            }
            println!("{} events in {}", total, path);
        }
    }
    Ok(())
}
