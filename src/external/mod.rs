//! Collaborator boundaries - identity provider, interview store, call transport
//!
//! The session core never talks to a concrete backend. The daemon and the
//! tests plug in the in-process implementations from [`memory`].

pub mod memory;

pub use memory::{FixedIdentity, LocalCallTransport, MemoryStore};

use crate::roster::AttributeUpdate;
use crate::session::{CallId, Identity, PersistedStatus, Session, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Interview store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("interview {0} not found")]
    NotFound(SessionId),

    #[error("interview {0} is completed and cannot change status")]
    TerminalStatus(SessionId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Call transport errors
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("call {0} does not exist")]
    UnknownCall(CallId),

    #[error("call {0} has ended")]
    CallEnded(CallId),

    #[error("{0}")]
    Unavailable(String),
}

/// Supplies the identity of the local user, if one is signed in
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Persistent storage of interview records
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Store a new interview record and return its id
    async fn create_interview(&self, session: Session) -> Result<SessionId, StoreError>;

    async fn set_status(&self, id: SessionId, status: PersistedStatus) -> Result<(), StoreError>;

    async fn get_interview(&self, id: SessionId) -> Result<Session, StoreError>;

    async fn find_by_call(&self, call_id: CallId) -> Result<Option<Session>, StoreError>;

    /// Interviews where `identity` is the host or an invitee
    async fn list_interviews_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Session>, StoreError>;
}

/// Handle to a call on the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallHandle {
    pub call_id: CallId,
}

impl CallHandle {
    pub fn new(call_id: CallId) -> Self {
        Self { call_id }
    }
}

/// Speaking/mute signal reported by the transport for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    pub call_id: CallId,
    pub identity: Identity,
    pub update: AttributeUpdate,
}

/// Real-time audio/video call transport
#[async_trait]
pub trait CallTransport: Send + Sync {
    async fn create_call(&self, session_id: SessionId) -> Result<CallHandle, TransportError>;

    async fn join(&self, call: &CallHandle, identity: &Identity) -> Result<(), TransportError>;

    /// Stop accepting media and disconnect every participant
    async fn end_call(&self, call: &CallHandle) -> Result<(), TransportError>;

    /// Per-participant telemetry, if the transport reports any
    fn telemetry(&self) -> Option<broadcast::Receiver<Telemetry>> {
        None
    }
}
