//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod institution;
mod instrument;
mod position;
pub mod prompt;
pub mod record;
pub mod result;
mod session;

pub use account::{Account, AccountType};
pub use institution::Institution;
pub use instrument::{AssetSubClass, Instrument};
pub use position::{Position, PositionView};
pub use prompt::{
    AccountDecision, AccountProposal, InstrumentDecision, InstrumentProposal, NewAccount,
    NewInstrument, PromptDecision, PromptRequest,
};
pub use record::{
    fields, NumberFormat, ParseDiagnostic, ParsedPositionRecord, RawRow, RecordKind, Severity,
    SourceRef,
};
pub use result::{Error, ImportError, OperationResult, ParseError, ValidationError};
pub use session::{FileMeta, ImportSession, PositionImportSummary, SessionStatus};
