//! Error taxonomy for session operations

use crate::external::{StoreError, TransportError};
use crate::session::Phase;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for session operations
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Errors surfaced by the session core
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("'{identity}' is not invited to this session")]
    NotInvited { identity: String },

    #[error("'{identity}' is not allowed to {action}")]
    NotAuthorized { identity: String, action: String },

    #[error("role lookup for '{identity}' is still pending")]
    RolePending { identity: String },

    #[error("'{identity}' has not joined this session")]
    NotAdmitted { identity: String },

    #[error("stale workspace revision: known {known}, current {current}")]
    StaleRevision { known: u64, current: u64 },

    #[error("chat message is empty")]
    EmptyMessage,

    #[error("invalid interview: {0}")]
    InvalidInterview(String),

    #[error("unknown question '{0}'")]
    UnknownQuestion(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session is {phase}, not live")]
    SessionNotLive { phase: Phase },

    #[error("termination already in progress")]
    TerminationInProgress,

    #[error("termination failed: {reason}")]
    TerminationFailed { reason: String },

    #[error("call transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    #[error("interview store error: {0}")]
    Store(#[from] StoreError),
}

/// Stable, serializable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotInvited,
    NotAuthorized,
    RolePending,
    NotAdmitted,
    StaleRevision,
    EmptyMessage,
    InvalidInterview,
    UnknownQuestion,
    SessionNotFound,
    SessionNotLive,
    TerminationInProgress,
    TerminationFailed,
    TransportUnavailable,
    Store,
    Protocol,
}

impl SessionError {
    pub fn not_authorized(identity: impl Into<String>, action: impl Into<String>) -> Self {
        Self::NotAuthorized {
            identity: identity.into(),
            action: action.into(),
        }
    }

    pub fn termination_failed(reason: impl Into<String>) -> Self {
        Self::TerminationFailed {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInvited { .. } => ErrorKind::NotInvited,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::RolePending { .. } => ErrorKind::RolePending,
            Self::NotAdmitted { .. } => ErrorKind::NotAdmitted,
            Self::StaleRevision { .. } => ErrorKind::StaleRevision,
            Self::EmptyMessage => ErrorKind::EmptyMessage,
            Self::InvalidInterview(_) => ErrorKind::InvalidInterview,
            Self::UnknownQuestion(_) => ErrorKind::UnknownQuestion,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::SessionNotLive { .. } => ErrorKind::SessionNotLive,
            Self::TerminationInProgress => ErrorKind::TerminationInProgress,
            Self::TerminationFailed { .. } => ErrorKind::TerminationFailed,
            Self::TransportUnavailable(_) => ErrorKind::TransportUnavailable,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Whether the caller may retry the same request after re-fetching state.
    ///
    /// `NotAuthorized` and `NotInvited` are terminal for the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StaleRevision { .. } | Self::TransportUnavailable(_) | Self::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_revision_is_recoverable() {
        let err = SessionError::StaleRevision {
            known: 1,
            current: 2,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::StaleRevision);
    }

    #[test]
    fn authorization_errors_are_terminal() {
        assert!(!SessionError::not_authorized("bob", "end the session").is_recoverable());
        assert!(!SessionError::NotInvited {
            identity: "eve".into()
        }
        .is_recoverable());
    }

    #[test]
    fn messages_name_the_identity() {
        let err = SessionError::not_authorized("bob", "end the session");
        assert_eq!(err.to_string(), "'bob' is not allowed to end the session");
    }
}
