//! Message types for the interview-room control protocol

use crate::chat::ChatMessage;
use crate::error::ErrorKind;
use crate::orchestrator::{JoinSnapshot, RosterSnapshot};
use crate::roster::{AttributeUpdate, Participant};
use crate::session::{
    CallId, EventEnvelope, Identity, NewInterview, Phase, RoleLookup, Session, SessionId,
    SessionSummary,
};
use crate::termination::TerminationState;
use crate::workspace::{WorkspaceEdit, WorkspaceState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Handshake with protocol version and the authenticated identity
    Hello {
        protocol_version: u32,
        identity: Identity,
        display_name: Option<String>,
    },

    /// Schedule a new interview hosted by this client
    Schedule { interview: NewInterview },

    /// List interviews this client hosts or is invited to
    ListInterviews,

    /// Look up an interview by the call id shared with participants
    FindByCall { call_id: CallId },

    /// Join a live session; later session commands target it
    Join { session_id: SessionId },

    /// Leave the joined session
    Leave,

    /// Request the joined session's current phase
    GetPhase,

    GetRoster,

    GetWorkspace,

    /// Chat messages after sequence `after`; 0 replays everything retained
    GetHistory { after: u64 },

    /// Propose a workspace edit against a known revision
    ProposeEdit {
        edit: WorkspaceEdit,
        known_revision: u64,
    },

    /// Post a chat message
    PostChat { body: String },

    /// Update this client's own media attributes
    UpdateAttributes { update: AttributeUpdate },

    /// End a session (host only); joining first is not required
    RequestTermination { session_id: SessionId },

    /// Disconnect; the server removes the client from the roster
    Detach,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Sent on connect
    Welcome {
        server_id: Uuid,
        protocol_version: u32,
    },

    /// Handshake response with the resolved role
    Identified { identity: Identity, role: RoleLookup },

    Scheduled { session: Session },

    Interviews { interviews: Vec<SessionSummary> },

    Interview { session: Session },

    Joined(Box<JoinSnapshot>),

    Phase { phase: Phase },

    Roster(RosterSnapshot),

    Workspace(WorkspaceState),

    History { messages: Vec<ChatMessage> },

    EditAccepted(WorkspaceState),

    ChatAccepted(ChatMessage),

    AttributesUpdated(Participant),

    TerminationResult { state: TerminationState },

    /// Change notification for the joined session
    Event(EventEnvelope),

    /// Events were dropped for this client; snapshots must be re-fetched
    Resync { missed: u64 },

    /// Error response
    Error { kind: ErrorKind, message: String },

    /// Acknowledgment (for commands that need confirmation)
    Ack { for_command: String },
}

impl ServerMessage {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn ack(for_command: &str) -> Self {
        ServerMessage::Ack {
            for_command: for_command.to_string(),
        }
    }
}

impl From<crate::error::SessionError> for ServerMessage {
    fn from(err: crate::error::SessionError) -> Self {
        ServerMessage::error(err.kind(), err.to_string())
    }
}
