//! Positions command - list stored positions

use anyhow::Result;

use super::{get_context, parse_account_type};
use crate::output::{self, format_decimal};

pub fn run(institution: Option<String>, account_type: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account_type = parse_account_type(account_type.as_deref())?;
    let positions = ctx
        .reference_service
        .positions(institution.as_deref(), account_type)?;

    if json {
        return output::json(&positions);
    }

    if positions.is_empty() {
        println!("No positions stored.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Institution",
        "Account",
        "Instrument",
        "ISIN",
        "Quantity",
        "Price",
        "Currency",
        "Date",
    ]);
    for view in &positions {
        let p = &view.position;
        table.add_row(vec![
            view.institution_code.clone(),
            view.account_number.clone(),
            view.instrument_name.clone(),
            view.isin.clone().unwrap_or_else(|| "-".to_string()),
            format_decimal(p.quantity),
            p.price.map(format_decimal).unwrap_or_else(|| "-".to_string()),
            p.currency.clone(),
            p.as_of_date.to_string(),
        ]);
    }
    println!("{}", table);
    println!("{} positions", positions.len());
    Ok(())
}
