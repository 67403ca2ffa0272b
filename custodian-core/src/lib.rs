//! Custodian Core - statement-to-position import pipeline
//!
//! This crate implements the import pipeline following hexagonal architecture:
//!
//! - **domain**: Core entities (Institution, Account, Instrument, Position, ImportSession)
//! - **ports**: Trait definitions for external dependencies (Repository, StatementParser,
//!   ResolutionPrompt, FxRateSource)
//! - **services**: Normalizer, resolver, session manager and the import orchestration
//! - **adapters**: Concrete implementations (DuckDB, format parsers, channel prompt)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use adapters::parsers::ParserRegistry;
use adapters::static_fx::StaticFxRates;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use adapters::channel_prompt::{prompt_channel, ChannelPrompt, PendingPrompt};
pub use domain::result::{Error, OperationResult};
pub use domain::{
    Account, AccountDecision, AccountType, ImportError, ImportSession, Institution, Instrument,
    InstrumentDecision, Position, PositionImportSummary, PositionView, PromptDecision,
    PromptRequest,
};
pub use ports::{AbortOnUnknown, AcceptAll, ResolutionPrompt};
pub use services::{
    suggest_institution, CallbackReporter, EntryPoint, ImportHandle, ImportRequest, LogEntry,
    LogEvent, LoggingService, NullReporter, ProgressEvent, ProgressReporter, ValueReport,
};

/// File name of the position store inside the data directory
pub const STORE_FILE: &str = "custodian.duckdb";

/// Main context for Custodian operations
///
/// Holds the store, the parser registry and every service wired together.
/// Nothing here is global; callers construct one per data directory.
pub struct CustodianContext {
    pub config: Config,
    pub data_dir: PathBuf,
    pub repository: Arc<DuckDbRepository>,
    pub parsers: Arc<ParserRegistry>,
    pub import_service: Arc<ImportService>,
    pub reference_service: ReferenceService,
    pub report_service: ReportService,
    pub status_service: StatusService,
    /// `None` when logs.duckdb could not be opened; logging never blocks imports
    pub logging_service: Option<Arc<LoggingService>>,
}

impl CustodianContext {
    pub fn new(data_dir: &Path, entry_point: EntryPoint) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("cannot create {}", data_dir.display()))?;
        let config = Config::load(data_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&data_dir.join(STORE_FILE))?);
        repository.ensure_schema()?;
        let store: Arc<dyn ports::Repository> = repository.clone();

        let parsers = Arc::new(ParserRegistry::from_config(&config));

        let logging_service =
            match LoggingService::new(data_dir, entry_point, env!("CARGO_PKG_VERSION")) {
                Ok(service) => Some(Arc::new(service)),
                Err(e) => {
                    tracing::warn!(error = %e, "import log unavailable");
                    None
                }
            };

        let mut import_service =
            ImportService::new(Arc::clone(&store), Arc::clone(&parsers), Some(data_dir));
        if let Some(logger) = &logging_service {
            import_service = import_service.with_logger(Arc::clone(logger));
        }

        let fx = Arc::new(StaticFxRates::from_config(&config));
        let report_service =
            ReportService::new(Arc::clone(&store), fx, config.base_currency.clone());
        let reference_service = ReferenceService::new(Arc::clone(&store), Arc::clone(&parsers));
        let status_service = StatusService::new(store);

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            repository,
            parsers,
            import_service: Arc::new(import_service),
            reference_service,
            report_service,
            status_service,
            logging_service,
        })
    }
}
