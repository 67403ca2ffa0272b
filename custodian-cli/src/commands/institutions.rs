//! Institutions command - list and register institutions

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, log_command};
use crate::output;

#[derive(Subcommand)]
pub enum InstitutionsCommands {
    /// List known institutions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register an institution
    Add {
        /// Short code, used in file names (e.g. UBS)
        code: String,
        /// Display name
        name: String,
        /// Default statement format tag (see `cust formats`)
        #[arg(long)]
        format: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: InstitutionsCommands) -> Result<()> {
    let ctx = get_context()?;
    match command {
        InstitutionsCommands::List { json } => {
            let institutions = ctx.reference_service.fetch_institutions()?;
            if json {
                return output::json(&institutions);
            }
            if institutions.is_empty() {
                println!("No institutions yet. Add one with `cust institutions add`.");
                return Ok(());
            }
            let mut table = output::create_table();
            table.set_header(vec!["Code", "Name", "Default format"]);
            for i in &institutions {
                table.add_row(vec![
                    i.code.as_str(),
                    i.name.as_str(),
                    output::or_dash(i.default_format.as_deref()),
                ]);
            }
            println!("{}", table);
        }
        InstitutionsCommands::Add {
            code,
            name,
            format,
            json,
        } => {
            log_command(&ctx, "institutions add");
            let institution =
                ctx.reference_service
                    .add_institution(&code, &name, format.as_deref())?;
            if json {
                return output::json(&institution);
            }
            output::success(&format!("Added {} ({})", institution.code, institution.name));
        }
    }
    Ok(())
}
