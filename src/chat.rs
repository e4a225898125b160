//! Chat channel - ordered, append-only message log of one session

use crate::error::{Result, SessionError};
use crate::session::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// An immutable chat message.
///
/// Ordering is by `sequence`, assigned by the channel; `created_at` is
/// informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sequence: u64,
    pub sender: Identity,
    pub sender_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Per-session chat log
#[derive(Debug)]
pub struct ChatChannel {
    history: VecDeque<ChatMessage>,
    last_sequence: u64,
    history_limit: usize,
}

impl ChatChannel {
    /// Create a channel retaining at most `history_limit` messages for replay
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: VecDeque::new(),
            last_sequence: 0,
            history_limit: history_limit.max(1),
        }
    }

    /// Append a message, assigning the next sequence number
    pub fn post(&mut self, sender: &Identity, sender_name: &str, body: &str) -> Result<ChatMessage> {
        if body.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.last_sequence += 1;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sequence: self.last_sequence,
            sender: sender.clone(),
            sender_name: sender_name.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(message.clone());

        Ok(message)
    }

    /// Retained messages in sequence order
    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.iter().cloned().collect()
    }

    /// Retained messages with a sequence greater than `after`
    pub fn history_since(&self, after: u64) -> Vec<ChatMessage> {
        self.history
            .iter()
            .filter(|m| m.sequence > after)
            .cloned()
            .collect()
    }

    /// Drop retained messages once the session is over.
    ///
    /// The sequence counter is kept so numbering never restarts.
    pub fn discard_history(&mut self) {
        self.history = VecDeque::new();
    }

    /// Sequence number of the newest message, or 0 if none was posted
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}
