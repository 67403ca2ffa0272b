//! Channel-backed resolution prompt
//!
//! Lets an import run on a worker thread while another thread (a UI loop, a
//! test) answers its questions. The worker blocks on each prompt until the
//! matching [`PendingPrompt`] is answered. Dropping either end aborts the
//! import instead of hanging it.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use crate::domain::{
    AccountDecision, AccountProposal, InstrumentDecision, InstrumentProposal, PromptDecision,
    PromptRequest,
};
use crate::ports::ResolutionPrompt;

/// A question from the import thread, with its reply slot
#[derive(Debug)]
pub struct PendingPrompt {
    request: PromptRequest,
    reply: SyncSender<PromptDecision>,
}

impl PendingPrompt {
    pub fn request(&self) -> &PromptRequest {
        &self.request
    }

    pub fn respond(self, decision: PromptDecision) {
        // The import thread may already be gone; nothing to do then
        let _ = self.reply.send(decision);
    }

    pub fn answer_account(self, decision: AccountDecision) {
        self.respond(PromptDecision::Account(decision));
    }

    pub fn answer_instrument(self, decision: InstrumentDecision) {
        self.respond(PromptDecision::Instrument(decision));
    }
}

/// Import-side half: implements [`ResolutionPrompt`] by round-tripping
/// through a channel
pub struct ChannelPrompt {
    requests: SyncSender<PendingPrompt>,
}

/// Create a connected prompt and the receiver its questions arrive on
pub fn prompt_channel() -> (ChannelPrompt, Receiver<PendingPrompt>) {
    let (requests, receiver) = sync_channel(0);
    (ChannelPrompt { requests }, receiver)
}

impl ChannelPrompt {
    fn ask(&self, request: PromptRequest) -> Option<PromptDecision> {
        let (reply, answer) = sync_channel(1);
        self.requests.send(PendingPrompt { request, reply }).ok()?;
        answer.recv().ok()
    }
}

impl ResolutionPrompt for ChannelPrompt {
    fn unknown_account(&mut self, proposal: &AccountProposal) -> AccountDecision {
        match self.ask(PromptRequest::UnknownAccount(proposal.clone())) {
            Some(PromptDecision::Account(decision)) => decision,
            Some(PromptDecision::Instrument(_)) => {
                tracing::warn!("instrument decision sent for an account prompt, aborting");
                AccountDecision::Abort
            }
            None => AccountDecision::Abort,
        }
    }

    fn unknown_instrument(&mut self, proposal: &InstrumentProposal) -> InstrumentDecision {
        match self.ask(PromptRequest::UnknownInstrument(proposal.clone())) {
            Some(PromptDecision::Instrument(decision)) => decision,
            Some(PromptDecision::Account(_)) => {
                tracing::warn!("account decision sent for an instrument prompt, aborting");
                InstrumentDecision::Abort
            }
            None => InstrumentDecision::Abort,
        }
    }
}
