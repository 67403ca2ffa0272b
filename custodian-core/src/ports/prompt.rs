//! Resolution prompt port
//!
//! The reference resolver calls into this when an account or instrument is
//! missing. Each call blocks the import until the caller decides.

use crate::domain::{AccountDecision, AccountProposal, InstrumentDecision, InstrumentProposal};

pub trait ResolutionPrompt {
    fn unknown_account(&mut self, proposal: &AccountProposal) -> AccountDecision;

    fn unknown_instrument(&mut self, proposal: &InstrumentProposal) -> InstrumentDecision;
}

/// Headless policy: accept every proposal as offered
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ResolutionPrompt for AcceptAll {
    fn unknown_account(&mut self, proposal: &AccountProposal) -> AccountDecision {
        AccountDecision::Save(proposal.accept())
    }

    fn unknown_instrument(&mut self, proposal: &InstrumentProposal) -> InstrumentDecision {
        InstrumentDecision::Save(proposal.accept())
    }
}

/// Headless policy: abort on the first missing entity
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortOnUnknown;

impl ResolutionPrompt for AbortOnUnknown {
    fn unknown_account(&mut self, _proposal: &AccountProposal) -> AccountDecision {
        AccountDecision::Abort
    }

    fn unknown_instrument(&mut self, _proposal: &InstrumentProposal) -> InstrumentDecision {
        InstrumentDecision::Abort
    }
}
