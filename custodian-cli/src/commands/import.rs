//! Import command - load a statement file into positions

use std::path::PathBuf;

use anyhow::{bail, Result};
use colored::Colorize;

use super::prompt::{SpinnerReporter, TerminalPrompt};
use super::{get_context, log_command, parse_account_type};
use crate::output;
use custodian_core::{
    suggest_institution, AbortOnUnknown, AcceptAll, ImportRequest, OperationResult,
    ResolutionPrompt,
};

pub struct ImportArgs {
    pub file: PathBuf,
    pub institution: Option<String>,
    pub format: Option<String>,
    pub replace: bool,
    pub account_type: Option<String>,
    pub session_name: Option<String>,
    pub yes: bool,
    pub json: bool,
}

pub fn run(args: ImportArgs) -> Result<()> {
    let ctx = get_context()?;
    log_command(&ctx, "import");

    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let institution = match args.institution {
        Some(code) => code,
        None => match suggest_institution(&file_name) {
            Some((code, date)) => {
                if !args.json {
                    output::info(&format!(
                        "Using institution {} from the file name (statement of {})",
                        code, date
                    ));
                }
                code
            }
            None => bail!(
                "--institution required: '{}' does not follow <CODE>_<YYYYMMDD>.<ext>",
                file_name
            ),
        },
    };

    let account_type = parse_account_type(args.account_type.as_deref())?;
    if account_type.is_some() && !args.replace {
        bail!("--account-type only narrows --replace");
    }

    let mut request = ImportRequest::new(&args.file, &institution);
    if let Some(format) = args.format {
        request = request.with_format(format);
    }
    if args.replace {
        request = request.replacing(account_type);
    }
    if let Some(name) = args.session_name {
        request = request.with_session_name(name);
    }

    let interactive = !args.json && !args.yes && atty::is(atty::Stream::Stdin);
    let reporter = SpinnerReporter::new(!args.json);
    let mut terminal = TerminalPrompt::new(reporter.spinner());
    let (mut accept_all, mut abort) = (AcceptAll, AbortOnUnknown);
    let prompt: &mut dyn ResolutionPrompt = if args.yes {
        &mut accept_all
    } else if interactive {
        &mut terminal
    } else {
        &mut abort
    };

    let result = ctx
        .import_service
        .import_statement(&request, prompt, &reporter);

    if args.json {
        let failed = result.is_err();
        output::json(&OperationResult::from(result))?;
        if failed {
            bail!("import failed");
        }
        return Ok(());
    }

    let summary = result?;
    output::success(&format!("Imported {}", file_name));

    let mut table = output::create_table();
    table.add_row(vec!["Rows in file", &summary.total_rows.to_string()]);
    table.add_row(vec!["Positions saved", &summary.parsed_rows.to_string()]);
    table.add_row(vec!["Securities", &summary.security_records.to_string()]);
    table.add_row(vec!["Cash", &summary.cash_accounts.to_string()]);
    println!("{}", table);

    let skipped = summary.total_rows.saturating_sub(summary.parsed_rows);
    if skipped > 0 {
        println!(
            "{}",
            format!("{} rows skipped, see `cust sessions --details`", skipped).yellow()
        );
    }
    Ok(())
}
