//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod fx;
mod prompt;
mod repository;
mod statement_parser;

pub use fx::FxRateSource;
pub use prompt::{AbortOnUnknown, AcceptAll, ResolutionPrompt};
pub use repository::{CommitOutcome, ImportBatch, ReplaceScope, Repository};
pub use statement_parser::{NormalizeOptions, ParseOutput, StatementParser};
