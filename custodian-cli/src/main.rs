//! Custodian CLI - statement imports in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    accounts, delete, formats, fx, import, institutions, instruments, logs, positions, report,
    sessions, status,
};

/// Custodian - bank and broker statements into one position store
#[derive(Parser)]
#[command(name = "cust", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a statement file
    Import {
        /// Statement file (CSV, XLSX or PDF)
        file: PathBuf,
        /// Institution code; guessed from <CODE>_<YYYYMMDD>.<ext> names when omitted
        #[arg(short, long)]
        institution: Option<String>,
        /// Parser tag (see `cust formats`)
        #[arg(long)]
        format: Option<String>,
        /// Replace the institution's stored positions, even for a file seen before
        #[arg(long)]
        replace: bool,
        /// With --replace, only replace positions in custody or cash accounts
        #[arg(long)]
        account_type: Option<String>,
        /// Session name shown in the import history
        #[arg(long)]
        name: Option<String>,
        /// Create every unknown account and instrument as proposed
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored positions
    Positions {
        #[arg(short, long)]
        institution: Option<String>,
        #[arg(long)]
        account_type: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete stored positions for an institution
    Delete {
        institution: String,
        #[arg(long)]
        account_type: Option<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage institutions
    Institutions {
        #[command(subcommand)]
        command: institutions::InstitutionsCommands,
    },

    /// Manage accounts
    Accounts {
        #[command(subcommand)]
        command: accounts::AccountsCommands,
    },

    /// Manage instruments
    Instruments {
        #[command(subcommand)]
        command: instruments::InstrumentsCommands,
    },

    /// List supported statement formats
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show import history
    Sessions {
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Print error logs and notes
        #[arg(long)]
        details: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Value positions in the base currency
    Report {
        #[arg(short, long)]
        institution: Option<String>,
        /// Write CSV to a file, or `-` for stdout
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage static exchange rates
    Fx {
        #[command(subcommand)]
        command: fx::FxCommands,
    },

    /// View the import log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },

    /// Show store summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CUSTODIAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Import {
            file,
            institution,
            format,
            replace,
            account_type,
            name,
            yes,
            json,
        } => import::run(import::ImportArgs {
            file,
            institution,
            format,
            replace,
            account_type,
            session_name: name,
            yes,
            json,
        }),
        Commands::Positions {
            institution,
            account_type,
            json,
        } => positions::run(institution, account_type, json),
        Commands::Delete {
            institution,
            account_type,
            force,
            json,
        } => delete::run(&institution, account_type, force, json),
        Commands::Institutions { command } => institutions::run(command),
        Commands::Accounts { command } => accounts::run(command),
        Commands::Instruments { command } => instruments::run(command),
        Commands::Formats { json } => formats::run(json),
        Commands::Sessions {
            limit,
            details,
            json,
        } => sessions::run(limit, details, json),
        Commands::Report {
            institution,
            csv,
            json,
        } => report::run(institution, csv, json),
        Commands::Fx { command } => fx::run(command),
        Commands::Logs { command } => logs::run(command),
        Commands::Status { json } => status::run(json),
    }
}
