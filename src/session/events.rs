//! Session change notifications and at-least-once de-duplication

use super::{Identity, SessionId};
use crate::chat::ChatMessage;
use crate::roster::Participant;
use crate::termination::TerminationState;
use crate::workspace::WorkspaceState;
use serde::{Deserialize, Serialize};

/// A change to one session's shared state.
///
/// Every counted event carries the counter it advanced so that receivers can
/// drop redeliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    ParticipantJoined {
        roster_version: u64,
        participant: Participant,
    },
    ParticipantLeft {
        roster_version: u64,
        identity: Identity,
    },
    ParticipantUpdated {
        roster_version: u64,
        participant: Participant,
    },
    WorkspaceChanged(WorkspaceState),
    ChatPosted(ChatMessage),
    Termination(TerminationState),
}

/// An event tagged with the session it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub session_id: SessionId,
    pub event: SessionEvent,
}

/// Tracks the newest counters applied by a receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCursor {
    roster_version: u64,
    revision: u64,
    sequence: u64,
}

impl EventCursor {
    /// Start from the counters of a snapshot the receiver already holds
    pub fn from_snapshot(roster_version: u64, revision: u64, sequence: u64) -> Self {
        Self {
            roster_version,
            revision,
            sequence,
        }
    }

    /// Sequence of the newest chat message applied
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if `event` is new and advances the cursor
    pub fn accept(&mut self, event: &SessionEvent) -> bool {
        let (slot, value) = match event {
            SessionEvent::ParticipantJoined { roster_version, .. }
            | SessionEvent::ParticipantLeft { roster_version, .. }
            | SessionEvent::ParticipantUpdated { roster_version, .. } => {
                (&mut self.roster_version, *roster_version)
            }
            SessionEvent::WorkspaceChanged(state) => (&mut self.revision, state.revision),
            SessionEvent::ChatPosted(message) => (&mut self.sequence, message.sequence),
            SessionEvent::Termination(_) => return true,
        };

        if value > *slot {
            *slot = value;
            true
        } else {
            false
        }
    }
}
