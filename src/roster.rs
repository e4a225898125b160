//! Roster - the live set of participants connected to a session

use crate::error::{Result, SessionError};
use crate::session::{Identity, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participant's role within one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Candidate,
}

/// Connection status of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Transient media attributes, reported by the participant or the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAttributes {
    pub speaking: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl Default for ParticipantAttributes {
    fn default() -> Self {
        Self {
            speaking: false,
            audio_enabled: true,
            video_enabled: false,
        }
    }
}

/// Partial update of [`ParticipantAttributes`]; `None` leaves a field as is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeUpdate {
    pub speaking: Option<bool>,
    pub audio_enabled: Option<bool>,
    pub video_enabled: Option<bool>,
}

impl AttributeUpdate {
    pub fn speaking(speaking: bool) -> Self {
        Self {
            speaking: Some(speaking),
            ..Default::default()
        }
    }

    pub fn muted(muted: bool) -> Self {
        Self {
            audio_enabled: Some(!muted),
            ..Default::default()
        }
    }

    fn apply(&self, attrs: &mut ParticipantAttributes) {
        if let Some(v) = self.speaking {
            attrs.speaking = v;
        }
        if let Some(v) = self.audio_enabled {
            attrs.audio_enabled = v;
        }
        if let Some(v) = self.video_enabled {
            attrs.video_enabled = v;
        }
    }
}

/// A connected participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub identity: Identity,
    pub display_name: String,
    pub role: ParticipantRole,
    pub status: ConnectionStatus,
    pub attributes: ParticipantAttributes,
    pub joined_at: DateTime<Utc>,
}

/// Result of an admit call
#[derive(Debug, Clone)]
pub struct Admission {
    pub participant: Participant,
    /// False when the identity was already on the roster
    pub newly_admitted: bool,
    pub roster_version: u64,
}

/// Outcome of releasing one connection
#[derive(Debug, Clone, PartialEq)]
pub enum Release {
    /// The last connection went away and the participant left the roster
    Removed(Participant),
    /// Other connections of the same identity keep the participant present
    StillConnected(usize),
    Absent,
}

/// Live roster of one session, kept in admission order.
///
/// An identity may be connected more than once; it stays on the roster until
/// every connection has been released.
#[derive(Debug, Default)]
pub struct Roster {
    participants: Vec<Participant>,
    connections: HashMap<Identity, usize>,
    version: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `identity` if the session invited it or it is the host.
    ///
    /// Admitting an identity that is already present counts one more
    /// connection and returns the existing entry without changing its
    /// position.
    pub fn admit(
        &mut self,
        session: &Session,
        identity: &Identity,
        display_name: &str,
    ) -> Result<Admission> {
        if !session.admits(identity) {
            return Err(SessionError::NotInvited {
                identity: identity.to_string(),
            });
        }

        if let Some(existing) = self.get(identity).cloned() {
            *self.connections.entry(identity.clone()).or_insert(0) += 1;
            return Ok(Admission {
                participant: existing,
                newly_admitted: false,
                roster_version: self.version,
            });
        }

        let role = if session.is_host(identity) {
            ParticipantRole::Host
        } else {
            ParticipantRole::Candidate
        };
        let display_name = match display_name.trim() {
            "" => identity.to_string(),
            name => name.to_string(),
        };
        let participant = Participant {
            identity: identity.clone(),
            display_name,
            role,
            status: ConnectionStatus::Connected,
            attributes: ParticipantAttributes::default(),
            joined_at: Utc::now(),
        };

        self.participants.push(participant.clone());
        self.connections.insert(identity.clone(), 1);
        self.version += 1;

        Ok(Admission {
            participant,
            newly_admitted: true,
            roster_version: self.version,
        })
    }

    /// Release one connection of `identity`, removing it with the last one
    pub fn release(&mut self, identity: &Identity) -> Release {
        let Some(index) = self
            .participants
            .iter()
            .position(|p| &p.identity == identity)
        else {
            return Release::Absent;
        };

        let remaining = match self.connections.get_mut(identity) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            return Release::StillConnected(remaining);
        }

        self.connections.remove(identity);
        let mut removed = self.participants.remove(index);
        removed.status = ConnectionStatus::Disconnected;
        self.version += 1;
        Release::Removed(removed)
    }

    /// Apply an attribute update to a participant's own entry
    pub fn update_attributes(
        &mut self,
        identity: &Identity,
        update: &AttributeUpdate,
    ) -> Result<Participant> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| &p.identity == identity)
            .ok_or_else(|| SessionError::NotAdmitted {
                identity: identity.to_string(),
            })?;

        update.apply(&mut participant.attributes);
        let updated = participant.clone();
        self.version += 1;
        Ok(updated)
    }

    /// Disconnect everyone, e.g. after the call was torn down.
    ///
    /// Each removal advances the version; the removed participants are
    /// returned in admission order with the version their removal produced.
    pub fn clear(&mut self) -> Vec<(u64, Participant)> {
        self.connections.clear();
        let mut removed = Vec::with_capacity(self.participants.len());
        for mut participant in self.participants.drain(..) {
            participant.status = ConnectionStatus::Disconnected;
            self.version += 1;
            removed.push((self.version, participant));
        }
        removed
    }

    pub fn get(&self, identity: &Identity) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.identity == identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.get(identity).is_some()
    }

    /// Fail unless `identity` is on the roster
    pub fn require_member(&self, identity: &Identity) -> Result<()> {
        if self.contains(identity) {
            Ok(())
        } else {
            Err(SessionError::NotAdmitted {
                identity: identity.to_string(),
            })
        }
    }

    /// Participants in admission order
    pub fn list(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
