//! Termination coordinator - owner-initiated end of a session
//!
//! # State Machine
//!
//! ```text
//!   Active ──begin──▶ Ending ──stop ok, commit ok──────────▶ Ended
//!     ▲                 │
//!     └──stop failed────┤
//!                       └──stop ok, commit exhausted──▶ EndFailed
//!   EndFailed ──begin──▶ Ending (commit only)
//! ```
//!
//! The call is always torn down before the record is marked completed, so a
//! session is never reported completed while participants are still
//! connected. A commit failure after a successful stop is retried with
//! bounded exponential backoff; if every attempt fails the session stays in
//! `EndFailed` (media stopped, record still non-terminal) and the host may
//! request termination again, which retries only the commit.

use crate::error::{Result, SessionError};
use crate::external::{CallHandle, CallTransport, InterviewStore, StoreError, TransportError};
use crate::session::{Caller, PersistedStatus, Session, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Termination state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationState {
    #[default]
    Active,
    Ending,
    Ended,
    /// Call stopped, completion not persisted
    EndFailed,
}

impl TerminationState {
    /// Whether the call has been torn down
    pub fn media_stopped(&self) -> bool {
        matches!(self, TerminationState::Ended | TerminationState::EndFailed)
    }
}

/// Backoff parameters for the completion commit
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total commit attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay following `current`, clamped to `max_backoff`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_backoff)
    }
}

/// What a granted termination request still has to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStep {
    StopThenCommit,
    /// The call is already down; only the commit is outstanding
    CommitOnly,
    AlreadyEnded,
}

/// Why an attempt to terminate did not reach `Ended`
#[derive(Debug, Clone, Error)]
pub enum TerminationFailure {
    #[error("call transport did not stop: {0}")]
    TransportStop(#[source] TransportError),

    #[error("completion not recorded after {attempts} attempts: {error}")]
    CommitExhausted {
        attempts: u32,
        #[source]
        error: StoreError,
    },
}

impl From<TerminationFailure> for SessionError {
    fn from(failure: TerminationFailure) -> Self {
        SessionError::termination_failed(failure.to_string())
    }
}

/// Per-session termination state machine
#[derive(Debug, Default)]
pub struct TerminationCoordinator {
    state: TerminationState,
}

impl TerminationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TerminationState {
        self.state
    }

    /// Enter `Ending` on behalf of `caller`.
    ///
    /// Only the session's host may end it. Nothing changes when the request
    /// is refused.
    pub fn begin(&mut self, session: &Session, caller: &Caller) -> Result<TerminationStep> {
        if !session.is_host(&caller.identity) {
            return Err(SessionError::not_authorized(
                caller.identity.as_str(),
                "end this session",
            ));
        }
        caller.require_resolved()?;

        let step = match self.state {
            TerminationState::Active => TerminationStep::StopThenCommit,
            TerminationState::EndFailed => TerminationStep::CommitOnly,
            TerminationState::Ending => return Err(SessionError::TerminationInProgress),
            TerminationState::Ended => return Ok(TerminationStep::AlreadyEnded),
        };
        self.state = TerminationState::Ending;
        Ok(step)
    }

    /// Leave `Ending` according to the outcome of [`execute`]
    pub fn complete(&mut self, outcome: &std::result::Result<u32, TerminationFailure>) {
        self.state = match outcome {
            Ok(_) => TerminationState::Ended,
            Err(TerminationFailure::TransportStop(_)) => TerminationState::Active,
            Err(TerminationFailure::CommitExhausted { .. }) => TerminationState::EndFailed,
        };
    }
}

/// Run the side effects of `step`: stop the call, then commit completion.
///
/// Returns the number of commit attempts used.
pub async fn execute(
    step: TerminationStep,
    session_id: SessionId,
    call: &CallHandle,
    transport: &dyn CallTransport,
    store: &dyn InterviewStore,
    policy: &RetryPolicy,
) -> std::result::Result<u32, TerminationFailure> {
    match step {
        TerminationStep::AlreadyEnded => return Ok(0),
        TerminationStep::StopThenCommit => {
            if let Err(e) = transport.end_call(call).await {
                tracing::error!(%session_id, error = %e, "Failed to stop call");
                return Err(TerminationFailure::TransportStop(e));
            }
            tracing::info!(%session_id, "Call stopped, recording completion");
        }
        TerminationStep::CommitOnly => {
            tracing::info!(%session_id, "Retrying completion commit");
        }
    }

    commit_with_backoff(session_id, store, policy).await
}

async fn commit_with_backoff(
    session_id: SessionId,
    store: &dyn InterviewStore,
    policy: &RetryPolicy,
) -> std::result::Result<u32, TerminationFailure> {
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_backoff;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match store
            .set_status(session_id, PersistedStatus::Completed)
            .await
        {
            Ok(()) => {
                tracing::info!(%session_id, attempt, "Session completed");
                return Ok(attempt);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(
                    %session_id,
                    attempt,
                    error = %e,
                    "Giving up on completion commit",
                );
                return Err(TerminationFailure::CommitExhausted { attempts: attempt, error: e });
            }
            Err(e) => {
                tracing::warn!(
                    %session_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Completion commit failed, retrying",
                );
            }
        }

        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}
