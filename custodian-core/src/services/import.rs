//! Import service - runs one statement file through the pipeline
//!
//! Parse, normalize and resolve happen strictly in file order on the calling
//! thread. Nothing reaches the store until the final commit, so an abort or a
//! failed commit leaves it exactly as it was.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use chrono::{NaiveDate, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::adapters::channel_prompt::{prompt_channel, PendingPrompt};
use crate::adapters::parsers::ParserRegistry;
use crate::domain::result::{Error, Result};
use crate::domain::{
    AccountType, FileMeta, ImportError, ImportSession, Institution, Position,
    PositionImportSummary,
};
use crate::ports::{ReplaceScope, Repository, ResolutionPrompt};
use crate::services::logging::LoggingService;
use crate::services::normalizer::RowNormalizer;
use crate::services::progress::{ProgressEvent, ProgressReporter, ReportingPrompt};
use crate::services::resolver::{ReferenceResolver, ResolutionOutcome};
use crate::services::session::{LockError, SessionManager};

/// Rows between two `RowsProcessed` events
const PROGRESS_INTERVAL: usize = 100;

/// One statement file to import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub path: PathBuf,
    pub institution_code: String,
    /// Parser tag, resolved from the institution and file name when absent
    pub format: Option<String>,
    /// Delete the scope's positions and import even if the file was seen
    pub replace_existing: bool,
    /// Narrows the replace scope to one account type
    pub account_type: Option<AccountType>,
    pub session_name: Option<String>,
}

impl ImportRequest {
    pub fn new(path: impl Into<PathBuf>, institution_code: &str) -> Self {
        Self {
            path: path.into(),
            institution_code: Institution::normalize_code(institution_code),
            format: None,
            replace_existing: false,
            account_type: None,
            session_name: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn replacing(mut self, account_type: Option<AccountType>) -> Self {
        self.replace_existing = true;
        self.account_type = account_type;
        self
    }

    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// An import running on a worker thread
pub struct ImportHandle {
    prompts: Receiver<PendingPrompt>,
    worker: JoinHandle<std::result::Result<PositionImportSummary, ImportError>>,
    file_name: String,
}

impl ImportHandle {
    /// Block until the import asks something, `None` once it has finished
    pub fn next_prompt(&self) -> Option<PendingPrompt> {
        self.prompts.recv().ok()
    }

    /// Wait for the result. Prompts still pending are answered with Abort.
    pub fn join(self) -> std::result::Result<PositionImportSummary, ImportError> {
        drop(self.prompts);
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => Err(ImportError::Io {
                file_name: self.file_name,
                message: "import worker panicked".to_string(),
            }),
        }
    }
}

pub struct ImportService {
    repository: Arc<dyn Repository>,
    parsers: Arc<ParserRegistry>,
    sessions: SessionManager,
    logger: Option<Arc<LoggingService>>,
}

impl ImportService {
    /// `data_dir` enables the cross-process import lock
    pub fn new(
        repository: Arc<dyn Repository>,
        parsers: Arc<ParserRegistry>,
        data_dir: Option<&Path>,
    ) -> Self {
        let sessions = SessionManager::new(Arc::clone(&repository), data_dir);
        Self {
            repository,
            parsers,
            sessions,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    /// Import one file synchronously. `on_result` fires exactly once.
    pub fn import_statement(
        &self,
        request: &ImportRequest,
        prompt: &mut dyn ResolutionPrompt,
        reporter: &dyn ProgressReporter,
    ) -> std::result::Result<PositionImportSummary, ImportError> {
        let mut format = None;
        let outcome = self.run(request, prompt, reporter, &mut format);

        if let Some(logger) = &self.logger {
            let logged = logger.log_import(&request.file_name(), format.as_deref(), outcome.as_ref());
            if let Err(e) = logged {
                tracing::warn!(error = %e, "failed to write import log");
            }
        }

        let result = outcome.map(|session| session.summary());
        reporter.on_result(&result);
        result
    }

    /// Run the import on a worker thread, answering prompts through the handle
    pub fn spawn_import(
        self: &Arc<Self>,
        request: ImportRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> std::result::Result<ImportHandle, ImportError> {
        let (mut prompt, prompts) = prompt_channel();
        let service = Arc::clone(self);
        let file_name = request.file_name();

        let worker = thread::Builder::new()
            .name("custodian-import".to_string())
            .spawn(move || service.import_statement(&request, &mut prompt, reporter.as_ref()))
            .map_err(|e| ImportError::Io {
                file_name: file_name.clone(),
                message: format!("could not start import worker: {}", e),
            })?;

        Ok(ImportHandle {
            prompts,
            worker,
            file_name,
        })
    }

    /// Delete stored positions for an institution, optionally one account type
    pub fn delete_positions(
        &self,
        institution_code: &str,
        account_type: Option<AccountType>,
    ) -> Result<usize> {
        let code = Institution::normalize_code(institution_code);
        let institution = self
            .repository
            .get_institution_by_code(&code)?
            .ok_or_else(|| Error::not_found(format!("institution {}", code)))?;
        self.sessions.replace_existing(&ReplaceScope {
            institution_id: institution.id,
            account_type,
        })
    }

    fn run(
        &self,
        request: &ImportRequest,
        prompt: &mut dyn ResolutionPrompt,
        reporter: &dyn ProgressReporter,
        format: &mut Option<String>,
    ) -> std::result::Result<ImportSession, ImportError> {
        let file_name = request.file_name();
        let persistence = |rows_processed: usize, e: &dyn std::fmt::Display| ImportError::Persistence {
            file_name: file_name.clone(),
            rows_processed,
            message: e.to_string(),
        };

        let institution = self
            .repository
            .get_institution_by_code(&request.institution_code)
            .map_err(|e| persistence(0, &e))?
            .ok_or_else(|| ImportError::InvalidRequest {
                file_name: file_name.clone(),
                message: format!("unknown institution '{}'", request.institution_code),
            })?;

        let _lock = self.sessions.lock().map_err(|e| match e {
            LockError::Busy => ImportError::Busy {
                file_name: file_name.clone(),
            },
            LockError::Io(e) => ImportError::Io {
                file_name: file_name.clone(),
                message: format!("could not take import lock: {}", e),
            },
        })?;

        let bytes = std::fs::read(&request.path).map_err(|e| ImportError::Io {
            file_name: file_name.clone(),
            message: format!("could not read file: {}", e),
        })?;
        reporter.on_progress(&ProgressEvent::FileRead {
            file_name: file_name.clone(),
            bytes: bytes.len() as u64,
        });
        let meta = FileMeta::from_bytes(&request.path, &bytes);

        let previous = self
            .sessions
            .find_duplicate(&meta)
            .map_err(|e| persistence(0, &e))?;
        if let (Some(previous), false) = (&previous, request.replace_existing) {
            return Err(ImportError::DuplicateFile {
                file_name: file_name.clone(),
                session_id: previous.id,
                imported_at: previous.completed_at.unwrap_or(previous.created_at),
            });
        }

        let parse_error = |message: String| ImportError::Parse {
            file_name: file_name.clone(),
            message,
        };
        let parser = self
            .parsers
            .resolve(request.format.as_deref(), &institution, &file_name)
            .map_err(|e| parse_error(e.message))?;
        *format = Some(parser.format().to_string());
        let output = parser.parse(&bytes).map_err(|e| parse_error(e.message))?;

        let rejected = output.rejected().count();
        reporter.on_progress(&ProgressEvent::RowsParsed {
            rows: output.rows.len(),
            rejected,
            format: parser.format().to_string(),
        });

        let mut session =
            self.sessions
                .begin(meta, &institution, request.session_name.as_deref());
        session.start().map_err(|e| persistence(0, &e))?;
        session.total_rows = output.total_rows();
        for diagnostic in output.rejected() {
            session.record_failure(diagnostic.to_string());
        }
        for diagnostic in output.warnings() {
            session.note(diagnostic.to_string());
        }
        if let Some(previous) = &previous {
            session.note(format!(
                "identical file already imported in session {}",
                previous.id
            ));
        }

        let normalizer = RowNormalizer::new(&institution.code, parser.normalize_options());
        let mut resolver = ReferenceResolver::new(self.repository.as_ref(), &institution);
        let mut prompt = ReportingPrompt::new(prompt, reporter);
        let mut positions = Vec::with_capacity(output.rows.len());

        for (index, row) in output.rows.iter().enumerate() {
            let record = match normalizer.normalize(row) {
                Ok(record) => record,
                Err(e) => {
                    session.record_failure(e.to_string());
                    continue;
                }
            };

            match resolver.resolve(&record, &mut prompt) {
                Ok((account, instrument)) => {
                    positions.push(Position {
                        id: Uuid::new_v4(),
                        session_id: session.id,
                        institution_id: institution.id,
                        account_id: account.id,
                        instrument_id: instrument.id,
                        kind: record.kind,
                        quantity: record.quantity,
                        price: record.price,
                        currency: record.currency.clone(),
                        as_of_date: record.as_of_date,
                        source_line: record.source.line,
                        created_at: Utc::now(),
                    });
                    session.record_success(record.kind);
                }
                Err(ResolutionOutcome::Ignored) => session.record_duplicate(format!(
                    "{}: instrument '{}' ignored",
                    record.source, record.instrument_name
                )),
                Err(ResolutionOutcome::Cancelled) => session.record_failure(format!(
                    "{}: account resolution cancelled",
                    record.source
                )),
                Err(ResolutionOutcome::Unresolved(message)) => {
                    session.record_failure(format!("{}: {}", record.source, message))
                }
                Err(ResolutionOutcome::Aborted) => {
                    let rows_processed = session.processed_rows();
                    self.record_failed(&mut session, "import aborted by user");
                    return Err(ImportError::ResolutionAborted {
                        file_name: file_name.clone(),
                        rows_processed,
                    });
                }
                Err(ResolutionOutcome::Repository(e)) => {
                    let rows_processed = session.processed_rows();
                    self.record_failed(&mut session, &format!("lookup failed: {}", e));
                    return Err(persistence(rows_processed, &e));
                }
            }

            if (index + 1) % PROGRESS_INTERVAL == 0 {
                reporter.on_progress(&ProgressEvent::RowsProcessed {
                    processed: session.processed_rows(),
                    total: session.total_rows,
                });
            }
        }
        reporter.on_progress(&ProgressEvent::RowsProcessed {
            processed: session.processed_rows(),
            total: session.total_rows,
        });

        let scope = request.replace_existing.then_some(ReplaceScope {
            institution_id: institution.id,
            account_type: request.account_type,
        });
        if let Some(scope) = &scope {
            match self.repository.count_positions(scope) {
                Ok(existing) => session.note(format!(
                    "replace mode: removing {} existing positions",
                    existing
                )),
                Err(e) => {
                    let rows_processed = session.processed_rows();
                    self.record_failed(&mut session, &format!("could not count positions: {}", e));
                    return Err(persistence(rows_processed, &e));
                }
            }
        }

        reporter.on_progress(&ProgressEvent::Persisting {
            positions: positions.len(),
        });
        let staged = resolver.into_staged();
        match self.sessions.commit(&mut session, staged, positions, scope) {
            Ok(outcome) => {
                reporter.on_progress(&ProgressEvent::PersistenceComplete {
                    inserted: outcome.inserted_positions,
                    removed: outcome.removed_positions,
                });
                Ok(session)
            }
            Err(e) => {
                let rows_processed = session.processed_rows();
                self.record_failed(&mut session, &format!("could not save positions: {}", e));
                Err(persistence(rows_processed, &e))
            }
        }
    }

    /// Close the session as Failed and store it. The import error is what
    /// the caller sees, so a failure to record is only logged.
    fn record_failed(&self, session: &mut ImportSession, reason: &str) {
        if let Err(e) = self.sessions.fail(session, reason) {
            tracing::warn!(session = %session.id, error = %e, "could not record failed session");
        }
    }
}

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]+)_(\d{8})\.[A-Za-z0-9]+$").expect("static pattern")
    })
}

/// Institution code and statement date from a `<CODE>_<YYYYMMDD>.<ext>` name
pub fn suggest_institution(file_name: &str) -> Option<(String, NaiveDate)> {
    let name = Path::new(file_name).file_name()?.to_str()?;
    let captures = file_name_pattern().captures(name)?;
    let date = NaiveDate::parse_from_str(&captures[2], "%Y%m%d").ok()?;
    Some((Institution::normalize_code(&captures[1]), date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_institution() {
        let (code, date) = suggest_institution("UBS_20241231.csv").unwrap();
        assert_eq!(code, "UBS");
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        let (code, _) = suggest_institution("/tmp/statements/zkb_20250131.xlsx").unwrap();
        assert_eq!(code, "ZKB");
    }

    #[test]
    fn test_suggest_institution_rejects_other_names() {
        assert!(suggest_institution("statement.csv").is_none());
        assert!(suggest_institution("UBS_2024-12-31.csv").is_none());
        assert!(suggest_institution("UBS_20241331.csv").is_none());
        assert!(suggest_institution("UBS_20241231").is_none());
    }

    #[test]
    fn test_request_builder() {
        let request = ImportRequest::new("/data/ubs_20241231.csv", " ubs ")
            .with_format("ch_custody_csv")
            .replacing(Some(AccountType::Custody));
        assert_eq!(request.institution_code, "UBS");
        assert_eq!(request.file_name(), "ubs_20241231.csv");
        assert_eq!(request.format.as_deref(), Some("ch_custody_csv"));
        assert!(request.replace_existing);
        assert_eq!(request.account_type, Some(AccountType::Custody));
    }
}
