//! Delete command - remove stored positions for an institution

use anyhow::Result;
use dialoguer::Confirm;

use super::{get_context, log_command, parse_account_type};
use crate::output;

pub fn run(institution: &str, account_type: Option<String>, force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account_type = parse_account_type(account_type.as_deref())?;

    if !force && !json {
        let scope = match account_type {
            Some(t) => format!("{} {} positions", institution.to_uppercase(), t),
            None => format!("all {} positions", institution.to_uppercase()),
        };
        if !Confirm::new()
            .with_prompt(format!("Delete {}?", scope))
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    log_command(&ctx, "delete");
    let removed = ctx.import_service.delete_positions(institution, account_type)?;

    if json {
        return output::json(&serde_json::json!({ "removed": removed }));
    }
    output::success(&format!("Removed {} positions", removed));
    Ok(())
}
