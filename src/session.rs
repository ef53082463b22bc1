//! Shell-side request state.
//!
//! A [`Session`] is owned by whatever drives the interface. It is the only
//! place [`RequestState`] lives; the orchestrator just reports results, and
//! the session observes them on its owner's thread through
//! [`Session::poll`] or [`Session::wait`].

use crate::{
    client::{Orchestrator, PendingGeneration, SizeAdvisory},
    error::GenerationError,
    models::{GenerationResult, ImageGenerationRequest},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

/// What happened to a [`Session::trigger`] call.
#[derive(Debug)]
pub enum TriggerOutcome {
    Dispatched,
    /// A request was already in flight; nothing was done.
    Ignored,
    /// The caller declined the size advisory; nothing was sent.
    Aborted(SizeAdvisory),
    /// Rejected before dispatch. The session is now `Failed`.
    Rejected(GenerationError),
}

pub struct Session {
    orchestrator: Orchestrator,
    state: RequestState,
    pending: Option<PendingGeneration>,
    last_result: Option<GenerationResult>,
}

impl Session {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            state: RequestState::Idle,
            pending: None,
            last_result: None,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn can_submit(&self) -> bool {
        self.state != RequestState::InFlight
    }

    pub fn last_result(&self) -> Option<&GenerationResult> {
        self.last_result.as_ref()
    }

    /// Starts a request unless one is already running. `confirm` is only
    /// consulted when the model will ignore the requested ratio.
    pub fn trigger<F>(&mut self, request: ImageGenerationRequest, confirm: F) -> TriggerOutcome
    where
        F: FnOnce(&SizeAdvisory) -> bool,
    {
        if !self.can_submit() {
            log::debug!("Ignoring submission while a request is in flight");
            return TriggerOutcome::Ignored;
        }

        let prepared = match self.orchestrator.prepare(request) {
            Ok(prepared) => prepared,
            Err(err) => {
                log::warn!("Request rejected: {}", err);
                self.state = RequestState::Failed;
                self.last_result = Some(Err(err.clone()));
                return TriggerOutcome::Rejected(err);
            }
        };

        if let Some(advisory) = prepared.advisory().copied() {
            if !confirm(&advisory) {
                log::info!("Submission aborted: {}", advisory);
                return TriggerOutcome::Aborted(advisory);
            }
        }

        self.pending = Some(self.orchestrator.submit_prepared(prepared));
        self.state = RequestState::InFlight;
        TriggerOutcome::Dispatched
    }

    /// Non-blocking. Returns the result the first time it is observed.
    pub fn poll(&mut self) -> Option<&GenerationResult> {
        let result = self.pending.as_mut()?.try_take()?;
        Some(self.complete(result))
    }

    /// Waits for the in-flight request, if any.
    pub async fn wait(&mut self) -> Option<&GenerationResult> {
        let pending = self.pending.take()?;
        let result = pending.wait().await;
        Some(self.complete(result))
    }

    fn complete(&mut self, result: GenerationResult) -> &GenerationResult {
        self.pending = None;
        self.state = if result.is_ok() {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        };
        self.last_result.insert(result)
    }
}
