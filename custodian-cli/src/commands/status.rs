//! Status command - store summary

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        return output::json(&status);
    }

    println!("{}", "Custodian Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Institutions", &status.total_institutions.to_string()]);
    table.add_row(vec!["Accounts", &status.total_accounts.to_string()]);
    table.add_row(vec!["Instruments", &status.total_instruments.to_string()]);
    table.add_row(vec!["Positions", &status.total_positions.to_string()]);
    println!("{}", table);
    println!();

    if let (Some(earliest), Some(latest)) = (&status.date_range.earliest, &status.date_range.latest) {
        println!("Statement dates: {} to {}", earliest, latest);
        println!();
    }

    if !status.institutions.is_empty() {
        println!("{}", "Institutions".bold());
        for i in &status.institutions {
            println!(
                "  • {} ({}): {} accounts, {} positions",
                i.code, i.name, i.accounts, i.positions
            );
        }
        println!();
    }

    if let Some(last) = &status.last_session {
        let state = last.status.as_str();
        println!(
            "Last import: {} [{}] {} saved, {} failed{}",
            last.session_name,
            state,
            last.successful_rows,
            last.failed_rows,
            last.finished_at
                .as_deref()
                .map(|t| format!(" at {}", t))
                .unwrap_or_default()
        );
    }
    Ok(())
}
