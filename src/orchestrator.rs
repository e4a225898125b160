//! Session orchestrator - admission, permissions and per-session serialization
//!
//! Every live session owns one [`RwLock`] around its roster, workspace, chat
//! log and termination state. Mutations take the write lock and complete
//! without awaiting anything else, so revision and sequence numbers are
//! assigned race-free and a caller that abandons a request before the lock
//! is acquired leaves no trace. Reads take the read lock and always observe a
//! whole mutation. Sessions never share a lock with each other.
//!
//! Change notifications go out on a per-session broadcast channel; sending
//! never waits for receivers, so a slow subscriber only loses its own
//! backlog.

use crate::chat::{ChatChannel, ChatMessage};
use crate::error::{Result, SessionError};
use crate::external::{CallHandle, CallTransport, InterviewStore, StoreError};
use crate::roster::{AttributeUpdate, Participant, Release, Roster};
use crate::session::{
    Caller, CallId, Clock, EventCursor, EventEnvelope, Identity, NewInterview, Phase,
    PersistedStatus, Session, SessionEvent, SessionId, SessionSummary, SystemClock,
};
use crate::termination::{self, RetryPolicy, TerminationCoordinator, TerminationState};
use crate::workspace::{Workspace, WorkspaceEdit, WorkspaceState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Tunables for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-session broadcast capacity; lagging receivers lose older events
    pub event_buffer: usize,
    /// Chat messages retained per session for replay
    pub chat_history_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            chat_history_limit: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Roster with the version it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterSnapshot {
    pub version: u64,
    pub participants: Vec<Participant>,
}

/// Everything a participant needs to render a session right after joining
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSnapshot {
    pub session: Session,
    pub participant: Participant,
    pub roster: RosterSnapshot,
    pub workspace: WorkspaceState,
    pub chat_history: Vec<ChatMessage>,
    pub last_sequence: u64,
}

impl JoinSnapshot {
    /// Cursor positioned just after this snapshot
    pub fn cursor(&self) -> EventCursor {
        EventCursor::from_snapshot(
            self.roster.version,
            self.workspace.revision,
            self.last_sequence,
        )
    }
}

/// Successful join: the snapshot plus the change stream that follows it
#[derive(Debug)]
pub struct JoinTicket {
    pub snapshot: JoinSnapshot,
    pub events: broadcast::Receiver<EventEnvelope>,
}

struct LiveState {
    roster: Roster,
    workspace: Workspace,
    chat: ChatChannel,
    termination: TerminationCoordinator,
}

struct LiveSession {
    session: Session,
    call: CallHandle,
    state: RwLock<LiveState>,
    events: broadcast::Sender<EventEnvelope>,
}

impl LiveSession {
    fn new(session: Session, config: &OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            call: CallHandle::new(session.call_id),
            session,
            state: RwLock::new(LiveState {
                roster: Roster::new(),
                workspace: Workspace::new(),
                chat: ChatChannel::new(config.chat_history_limit),
                termination: TerminationCoordinator::new(),
            }),
            events,
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(EventEnvelope {
            session_id: self.session.id,
            event,
        });
    }
}

/// Composes roster, workspace, chat and termination for every session
pub struct SessionOrchestrator {
    store: Arc<dyn InterviewStore>,
    transport: Arc<dyn CallTransport>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    live: RwLock<HashMap<SessionId, Arc<LiveSession>>>,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        transport: Arc<dyn CallTransport>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            transport,
            clock: Arc::new(SystemClock),
            config,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the wall clock, e.g. with a [`crate::session::FixedClock`]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Schedule a new interview hosted by `caller`.
    ///
    /// The call is created before the record; if the record cannot be stored
    /// the call is ended again.
    pub async fn schedule(&self, caller: &Caller, fields: NewInterview) -> Result<Session> {
        caller.require_interviewer("schedule interviews")?;

        let title = fields.title.trim().to_string();
        if title.is_empty() {
            return Err(SessionError::InvalidInterview("title is empty".into()));
        }

        let host = caller.identity.clone();
        let mut invited: Vec<Identity> = Vec::with_capacity(fields.invited.len());
        for identity in fields.invited {
            if identity != host && !invited.contains(&identity) {
                invited.push(identity);
            }
        }

        let id = SessionId::new();
        let call = self.transport.create_call(id).await?;

        let session = Session {
            id,
            title,
            description: fields.description.filter(|d| !d.trim().is_empty()),
            scheduled_start: fields.scheduled_start,
            host,
            invited,
            call_id: call.call_id,
            status: PersistedStatus::Scheduled,
        };

        match self.store.create_interview(session.clone()).await {
            Ok(stored_id) => {
                tracing::info!(
                    session_id = %stored_id,
                    call_id = %call.call_id,
                    host = %session.host,
                    "Scheduled interview '{}'",
                    session.title
                );
                Ok(Session {
                    id: stored_id,
                    ..session
                })
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to store interview");
                if let Err(end_err) = self.transport.end_call(&call).await {
                    tracing::warn!(call_id = %call.call_id, error = %end_err, "Failed to discard call");
                }
                Err(e.into())
            }
        }
    }

    /// Interviews involving `identity`, with phases derived now
    pub async fn list_interviews(&self, identity: &Identity) -> Result<Vec<SessionSummary>> {
        let mut sessions = self.store.list_interviews_for_identity(identity).await?;
        sessions.sort_by_key(|s| s.scheduled_start);

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let phase = self.derive(&session).await;
            summaries.push(SessionSummary { session, phase });
        }
        Ok(summaries)
    }

    pub async fn find_by_call(&self, call_id: CallId) -> Result<Session> {
        self.store
            .find_by_call(call_id)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(call_id.to_string()))
    }

    /// Current phase, re-derived on every call
    pub async fn phase(&self, session_id: SessionId) -> Result<Phase> {
        let session = self.load(session_id).await?;
        Ok(self.derive(&session).await)
    }

    /// Admit `caller` to the call and the roster.
    ///
    /// Every successful join counts one connection of the caller's identity
    /// and must be paired with one [`SessionOrchestrator::leave`].
    pub async fn join(
        &self,
        session_id: SessionId,
        caller: &Caller,
        display_name: &str,
    ) -> Result<JoinTicket> {
        let live = self.live_session(session_id).await?;
        let identity = &caller.identity;

        if !live.session.admits(identity) {
            tracing::info!(%session_id, %identity, "Rejected uninvited join");
            return Err(SessionError::NotInvited {
                identity: identity.to_string(),
            });
        }

        let phase = self.phase(session_id).await?;
        if phase != Phase::Live {
            return Err(SessionError::SessionNotLive { phase });
        }
        ensure_joinable(live.state.read().await.termination.state())?;

        self.transport.join(&live.call, identity).await?;

        let mut state = live.state.write().await;
        ensure_joinable(state.termination.state())?;

        let admission = state.roster.admit(&live.session, identity, display_name)?;
        if admission.newly_admitted {
            tracing::info!(%session_id, %identity, "Participant joined");
            live.publish(SessionEvent::ParticipantJoined {
                roster_version: admission.roster_version,
                participant: admission.participant.clone(),
            });
        }

        let snapshot = JoinSnapshot {
            session: live.session.clone(),
            participant: admission.participant,
            roster: RosterSnapshot {
                version: state.roster.version(),
                participants: state.roster.list(),
            },
            workspace: state.workspace.snapshot(),
            chat_history: state.chat.history(),
            last_sequence: state.chat.last_sequence(),
        };
        let events = live.events.subscribe();

        Ok(JoinTicket { snapshot, events })
    }

    /// Release one connection of `identity`.
    ///
    /// Returns true when that was its last connection and it left the roster.
    pub async fn leave(&self, session_id: SessionId, identity: &Identity) -> bool {
        let Some(live) = self.live.read().await.get(&session_id).cloned() else {
            return false;
        };

        let mut state = live.state.write().await;
        match state.roster.release(identity) {
            Release::Removed(_) => {
                tracing::info!(%session_id, %identity, "Participant left");
                live.publish(SessionEvent::ParticipantLeft {
                    roster_version: state.roster.version(),
                    identity: identity.clone(),
                });
                true
            }
            Release::StillConnected(remaining) => {
                tracing::debug!(%session_id, %identity, remaining, "Connection released");
                false
            }
            Release::Absent => false,
        }
    }

    /// Update the caller's own speaking/mute attributes
    pub async fn update_attributes(
        &self,
        session_id: SessionId,
        identity: &Identity,
        update: AttributeUpdate,
    ) -> Result<Participant> {
        let live = self.live_session(session_id).await?;
        Self::apply_attributes(&live, identity, &update).await
    }

    /// Apply transport telemetry for a participant of the call `call_id`
    pub async fn apply_telemetry(
        &self,
        call_id: CallId,
        identity: &Identity,
        update: AttributeUpdate,
    ) -> Result<Participant> {
        let live = self
            .live
            .read()
            .await
            .values()
            .find(|l| l.session.call_id == call_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(call_id.to_string()))?;
        Self::apply_attributes(&live, identity, &update).await
    }

    async fn apply_attributes(
        live: &LiveSession,
        identity: &Identity,
        update: &AttributeUpdate,
    ) -> Result<Participant> {
        let mut state = live.state.write().await;
        let participant = state.roster.update_attributes(identity, update)?;
        live.publish(SessionEvent::ParticipantUpdated {
            roster_version: state.roster.version(),
            participant: participant.clone(),
        });
        Ok(participant)
    }

    pub async fn roster(&self, session_id: SessionId) -> Result<RosterSnapshot> {
        let live = self.live_session(session_id).await?;
        let state = live.state.read().await;
        Ok(RosterSnapshot {
            version: state.roster.version(),
            participants: state.roster.list(),
        })
    }

    pub async fn workspace(&self, session_id: SessionId) -> Result<WorkspaceState> {
        let live = self.live_session(session_id).await?;
        let snapshot = live.state.read().await.workspace.snapshot();
        Ok(snapshot)
    }

    /// Propose a workspace edit against `known_revision`
    pub async fn propose_workspace_edit(
        &self,
        session_id: SessionId,
        identity: &Identity,
        edit: WorkspaceEdit,
        known_revision: u64,
    ) -> Result<WorkspaceState> {
        let live = self.live_session(session_id).await?;
        let mut state = live.state.write().await;
        state.roster.require_member(identity)?;

        let updated = state.workspace.propose(identity, edit, known_revision)?;
        tracing::debug!(%session_id, %identity, revision = updated.revision, "Workspace edit accepted");
        live.publish(SessionEvent::WorkspaceChanged(updated.clone()));
        Ok(updated)
    }

    /// Post a chat message and fan it out to current participants
    pub async fn post_chat_message(
        &self,
        session_id: SessionId,
        identity: &Identity,
        body: &str,
    ) -> Result<ChatMessage> {
        let live = self.live_session(session_id).await?;
        let mut state = live.state.write().await;
        let sender_name = state
            .roster
            .get(identity)
            .map(|p| p.display_name.clone())
            .ok_or_else(|| SessionError::NotAdmitted {
                identity: identity.to_string(),
            })?;

        let message = state.chat.post(identity, &sender_name, body)?;
        tracing::debug!(%session_id, %identity, sequence = message.sequence, "Chat message posted");
        live.publish(SessionEvent::ChatPosted(message.clone()));
        Ok(message)
    }

    /// Retained chat messages; empty once the session has ended
    pub async fn chat_history(&self, session_id: SessionId) -> Result<Vec<ChatMessage>> {
        self.chat_history_since(session_id, 0).await
    }

    /// Retained chat messages with a sequence greater than `after`
    pub async fn chat_history_since(
        &self,
        session_id: SessionId,
        after: u64,
    ) -> Result<Vec<ChatMessage>> {
        let live = self.live_session(session_id).await?;
        let history = live.state.read().await.chat.history_since(after);
        Ok(history)
    }

    /// Subscribe to the session's change stream without joining it
    pub async fn subscribe(
        &self,
        session_id: SessionId,
    ) -> Result<broadcast::Receiver<EventEnvelope>> {
        let live = self.live_session(session_id).await?;
        Ok(live.events.subscribe())
    }

    pub async fn termination_state(&self, session_id: SessionId) -> Result<TerminationState> {
        let live = self.live_session(session_id).await?;
        let state = live.state.read().await.termination.state();
        Ok(state)
    }

    /// End the session on behalf of its host.
    ///
    /// The side effects run on their own task, so dropping the returned
    /// future does not strand the session in `Ending`.
    pub async fn request_termination(
        &self,
        session_id: SessionId,
        caller: &Caller,
    ) -> Result<TerminationState> {
        let live = self.live_session(session_id).await?;

        let step = {
            let mut state = live.state.write().await;
            let step = state.termination.begin(&live.session, caller)?;
            if step == termination::TerminationStep::AlreadyEnded {
                return Ok(TerminationState::Ended);
            }
            live.publish(SessionEvent::Termination(TerminationState::Ending));
            step
        };
        tracing::info!(%session_id, host = %caller.identity, ?step, "Ending session");

        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let policy = self.config.retry.clone();
        let task_live = Arc::clone(&live);

        let handle = tokio::spawn(async move {
            let outcome = termination::execute(
                step,
                session_id,
                &task_live.call,
                transport.as_ref(),
                store.as_ref(),
                &policy,
            )
            .await;

            let mut state = task_live.state.write().await;
            state.termination.complete(&outcome);
            let final_state = state.termination.state();
            if final_state.media_stopped() {
                for (roster_version, participant) in state.roster.clear() {
                    task_live.publish(SessionEvent::ParticipantLeft {
                        roster_version,
                        identity: participant.identity,
                    });
                }
            }
            if final_state == TerminationState::Ended {
                state.chat.discard_history();
            }
            task_live.publish(SessionEvent::Termination(final_state));
            (final_state, outcome)
        });

        match handle.await {
            Ok((final_state, Ok(_))) => Ok(final_state),
            Ok((_, Err(failure))) => Err(failure.into()),
            Err(e) => Err(SessionError::termination_failed(format!(
                "termination task aborted: {}",
                e
            ))),
        }
    }

    /// Phase of `session`, honouring a completion this process already saw
    async fn derive(&self, session: &Session) -> Phase {
        let live = self.live.read().await.get(&session.id).cloned();
        let ended_here = match live {
            Some(live) => live.state.read().await.termination.state() == TerminationState::Ended,
            None => false,
        };
        if ended_here {
            Phase::Completed
        } else {
            session.phase_at(self.clock.now())
        }
    }

    async fn load(&self, session_id: SessionId) -> Result<Session> {
        match self.store.get_interview(session_id).await {
            Ok(session) => Ok(session),
            Err(StoreError::NotFound(_)) => {
                Err(SessionError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn live_session(&self, session_id: SessionId) -> Result<Arc<LiveSession>> {
        if let Some(live) = self.live.read().await.get(&session_id) {
            return Ok(Arc::clone(live));
        }

        let session = self.load(session_id).await?;
        let mut registry = self.live.write().await;
        let live = registry
            .entry(session_id)
            .or_insert_with(|| Arc::new(LiveSession::new(session, &self.config)));
        Ok(Arc::clone(live))
    }
}

fn ensure_joinable(state: TerminationState) -> Result<()> {
    match state {
        TerminationState::Active => Ok(()),
        TerminationState::Ended => Err(SessionError::SessionNotLive {
            phase: Phase::Completed,
        }),
        TerminationState::Ending | TerminationState::EndFailed => {
            Err(SessionError::TerminationInProgress)
        }
    }
}
