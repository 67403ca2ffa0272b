//! Progress and result reporting
//!
//! Reporters only observe. They are called from the import thread and must
//! hand anything UI-bound over to their own context.

use std::fmt;

use crate::domain::{
    AccountDecision, AccountProposal, ImportError, InstrumentDecision, InstrumentProposal,
    PositionImportSummary, PromptRequest,
};
use crate::ports::ResolutionPrompt;

/// Coarse pipeline milestones
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    FileRead { file_name: String, bytes: u64 },
    RowsParsed { rows: usize, rejected: usize, format: String },
    RowsProcessed { processed: usize, total: usize },
    PromptPending { subject: String },
    Persisting { positions: usize },
    PersistenceComplete { inserted: usize, removed: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileRead { file_name, bytes } => write!(f, "Read {} ({} bytes)", file_name, bytes),
            Self::RowsParsed { rows, rejected, format } => {
                write!(f, "Parsed {} rows as {}", rows, format)?;
                if *rejected > 0 {
                    write!(f, ", {} unreadable", rejected)?;
                }
                Ok(())
            }
            Self::RowsProcessed { processed, total } => {
                write!(f, "Processed {}/{} rows", processed, total)
            }
            Self::PromptPending { subject } => write!(f, "Waiting for a decision on {}", subject),
            Self::Persisting { positions } => write!(f, "Saving {} positions", positions),
            Self::PersistenceComplete { inserted, removed } => {
                write!(f, "Saved {} positions", inserted)?;
                if *removed > 0 {
                    write!(f, ", replaced {}", removed)?;
                }
                Ok(())
            }
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    /// Fired exactly once per import
    fn on_result(&self, result: &Result<PositionImportSummary, ImportError>);
}

/// Ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn on_result(&self, _result: &Result<PositionImportSummary, ImportError>) {}
}

type ProgressFn = Box<dyn Fn(&ProgressEvent) + Send + Sync>;
type ResultFn = Box<dyn Fn(&Result<PositionImportSummary, ImportError>) + Send + Sync>;

/// Adapts a pair of closures
pub struct CallbackReporter {
    progress: ProgressFn,
    result: ResultFn,
}

impl CallbackReporter {
    pub fn new<P, R>(progress: P, result: R) -> Self
    where
        P: Fn(&ProgressEvent) + Send + Sync + 'static,
        R: Fn(&Result<PositionImportSummary, ImportError>) + Send + Sync + 'static,
    {
        Self {
            progress: Box::new(progress),
            result: Box::new(result),
        }
    }
}

impl ProgressReporter for CallbackReporter {
    fn on_progress(&self, event: &ProgressEvent) {
        (self.progress)(event)
    }

    fn on_result(&self, result: &Result<PositionImportSummary, ImportError>) {
        (self.result)(result)
    }
}

/// Announces each prompt on the reporter before delegating
pub(crate) struct ReportingPrompt<'p> {
    inner: &'p mut dyn ResolutionPrompt,
    reporter: &'p dyn ProgressReporter,
}

impl<'p> ReportingPrompt<'p> {
    pub fn new(inner: &'p mut dyn ResolutionPrompt, reporter: &'p dyn ProgressReporter) -> Self {
        Self { inner, reporter }
    }

    fn announce(&self, request: PromptRequest) {
        self.reporter.on_progress(&ProgressEvent::PromptPending {
            subject: request.subject(),
        });
    }
}

impl ResolutionPrompt for ReportingPrompt<'_> {
    fn unknown_account(&mut self, proposal: &AccountProposal) -> AccountDecision {
        self.announce(PromptRequest::UnknownAccount(proposal.clone()));
        self.inner.unknown_account(proposal)
    }

    fn unknown_instrument(&mut self, proposal: &InstrumentProposal) -> InstrumentDecision {
        self.announce(PromptRequest::UnknownInstrument(proposal.clone()));
        self.inner.unknown_instrument(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountType, SourceRef};
    use crate::ports::AbortOnUnknown;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[test]
    fn test_event_messages() {
        let parsed = ProgressEvent::RowsParsed {
            rows: 120,
            rejected: 2,
            format: "csv".to_string(),
        };
        assert_eq!(parsed.to_string(), "Parsed 120 rows as csv, 2 unreadable");
        let done = ProgressEvent::PersistenceComplete {
            inserted: 118,
            removed: 0,
        };
        assert_eq!(done.to_string(), "Saved 118 positions");
    }

    #[test]
    fn test_reporting_prompt_announces() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = CallbackReporter::new(
            move |event| sink.lock().unwrap().push(event.to_string()),
            |_| {},
        );
        let mut inner = AbortOnUnknown;
        let mut prompt = ReportingPrompt::new(&mut inner, &reporter);

        let proposal = AccountProposal {
            institution_id: Uuid::new_v4(),
            institution_code: "UBS".to_string(),
            account_number: "A-1".to_string(),
            account_name: "A-1".to_string(),
            currency: "CHF".to_string(),
            account_type: AccountType::Custody,
            source: SourceRef::line(3),
        };
        assert_eq!(prompt.unknown_account(&proposal), AccountDecision::Abort);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["Waiting for a decision on account A-1".to_string()]
        );
    }
}
