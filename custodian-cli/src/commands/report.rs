//! Report command - position values in the base currency

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::get_context;
use crate::output;

pub fn run(institution: Option<String>, csv: Option<PathBuf>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let institution_id = match institution {
        Some(code) => Some(ctx.reference_service.get_institution(&code)?.id),
        None => None,
    };
    let report = ctx.report_service.value_report(institution_id)?;

    if json {
        return output::json(&report);
    }

    if let Some(path) = csv {
        if path.as_os_str() == "-" {
            report.write_csv(std::io::stdout().lock())?;
        } else {
            let file = File::create(&path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            report.write_csv(BufWriter::new(file))?;
            output::success(&format!("Report written to {}", path.display()));
        }
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Instrument".to_string(),
        "Currency".to_string(),
        "Value".to_string(),
        format!("Value {}", report.base_currency),
    ]);
    for row in &report.rows {
        table.add_row(vec![
            row.instrument.clone(),
            row.currency.clone(),
            row.value
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string()),
            row.base_value
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.add_row(vec![
        "Total".to_string(),
        report.base_currency.clone(),
        String::new(),
        format!("{:.2}", report.total),
    ]);
    println!("{}", table);

    let unpriced = report.unpriced();
    if unpriced > 0 {
        output::warning(&format!(
            "{} securities have no price and are not in the total",
            unpriced
        ));
    }
    let missing = report.unconverted() - unpriced;
    if missing > 0 {
        output::warning(&format!(
            "{} rows have no {} rate and are not in the total; add one with `cust fx set`",
            missing, report.base_currency,
        ));
    }
    Ok(())
}
