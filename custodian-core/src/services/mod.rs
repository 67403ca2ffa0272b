//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The import
//! pipeline runs normalizer -> resolver -> session manager, driven by the
//! import service; the rest serve the caller around it.

pub mod import;
pub mod logging;
pub mod migration;
pub mod normalizer;
pub mod progress;
mod reference;
mod report;
pub mod resolver;
pub mod session;
mod status;

pub use import::{suggest_institution, ImportHandle, ImportRequest, ImportService};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use normalizer::RowNormalizer;
pub use progress::{CallbackReporter, NullReporter, ProgressEvent, ProgressReporter};
pub use reference::ReferenceService;
pub use report::{ReportService, ValueReport, ValueRow};
pub use resolver::{Lookup, ReferenceResolver, ResolutionOutcome, StagedEntities};
pub use session::{LockError, SessionLock, SessionManager};
pub use status::{DateRange, InstitutionSummary, SessionSummary, StatusService, StatusSummary};
