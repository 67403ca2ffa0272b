//! Sessions command - import history

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;
use custodian_core::domain::SessionStatus;

pub fn run(limit: usize, details: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let sessions = ctx.reference_service.sessions(limit)?;

    if json {
        return output::json(&sessions);
    }

    if sessions.is_empty() {
        println!("No imports yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Started", "Session", "Status", "Rows", "Saved", "Failed", "Skipped"]);
    for s in &sessions {
        let status = match s.status {
            SessionStatus::Completed => s.status.as_str().green().to_string(),
            SessionStatus::Failed => s.status.as_str().red().to_string(),
            _ => s.status.as_str().yellow().to_string(),
        };
        table.add_row(vec![
            s.created_at.format("%Y-%m-%d %H:%M").to_string(),
            s.session_name.clone(),
            status,
            s.total_rows.to_string(),
            s.successful_rows.to_string(),
            s.failed_rows.to_string(),
            s.duplicate_rows.to_string(),
        ]);
    }
    println!("{}", table);

    if details {
        for s in sessions
            .iter()
            .filter(|s| !s.error_log.is_empty() || !s.processing_notes.is_empty())
        {
            println!();
            println!("{}", s.session_name.bold());
            for note in &s.processing_notes {
                println!("  {}", note.dimmed());
            }
            for error in &s.error_log {
                println!("  {}", error.red());
            }
        }
    }
    Ok(())
}
