//! Session records - identities, scheduled interviews and their metadata

mod events;
mod phase;
mod role;

pub use events::{EventCursor, EventEnvelope, SessionEvent};
pub use phase::{derive_phase, Clock, FixedClock, Phase, SystemClock};
pub use role::{Caller, Role, RoleLookup, RoleResolver, StaticDirectory};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An authenticated identity, as issued by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the session's call on the external call transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status as persisted by the interview store.
///
/// Only the terminal state is stored; every other phase is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistedStatus {
    #[default]
    Scheduled,
    Completed,
}

/// Fields supplied by a host when scheduling an interview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInterview {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_start: DateTime<Utc>,
    pub invited: Vec<Identity>,
}

/// A scheduled interview as stored by the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_start: DateTime<Utc>,
    pub host: Identity,
    pub invited: Vec<Identity>,
    pub call_id: CallId,
    pub status: PersistedStatus,
}

impl Session {
    pub fn is_completed(&self) -> bool {
        self.status == PersistedStatus::Completed
    }

    pub fn is_host(&self, identity: &Identity) -> bool {
        &self.host == identity
    }

    /// Whether `identity` may be admitted to the roster
    pub fn admits(&self, identity: &Identity) -> bool {
        self.is_host(identity) || self.invited.contains(identity)
    }

    /// Phase of this session at `now`
    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        derive_phase(self.scheduled_start, now, self.is_completed())
    }
}

/// A session paired with its phase at the time it was listed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: Session,
    pub phase: Phase,
}
