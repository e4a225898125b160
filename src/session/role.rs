//! Role resolution - maps identities to interviewer or candidate

use super::Identity;
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Directory role of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May schedule and host interviews
    Interviewer,
    Candidate,
}

/// Outcome of a directory lookup.
///
/// `Pending` is never treated as either role: gated actions are suspended
/// until the lookup resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleLookup {
    Pending,
    Resolved(Role),
}

impl RoleLookup {
    pub fn role(&self) -> Option<Role> {
        match self {
            RoleLookup::Pending => None,
            RoleLookup::Resolved(role) => Some(*role),
        }
    }
}

/// External directory that resolves an identity's role
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve_role(&self, identity: &Identity) -> RoleLookup;
}

/// The identity behind a request, with its role resolved explicitly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub identity: Identity,
    pub role: RoleLookup,
}

impl Caller {
    pub fn new(identity: impl Into<Identity>, role: RoleLookup) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    pub fn interviewer(identity: impl Into<Identity>) -> Self {
        Self::new(identity, RoleLookup::Resolved(Role::Interviewer))
    }

    pub fn candidate(identity: impl Into<Identity>) -> Self {
        Self::new(identity, RoleLookup::Resolved(Role::Candidate))
    }

    /// Resolve `identity` through `resolver`
    pub async fn resolve(identity: Identity, resolver: &dyn RoleResolver) -> Self {
        let role = resolver.resolve_role(&identity).await;
        Self { identity, role }
    }

    /// Fail unless the role lookup has completed
    pub fn require_resolved(&self) -> Result<Role> {
        self.role.role().ok_or_else(|| SessionError::RolePending {
            identity: self.identity.to_string(),
        })
    }

    /// Fail unless the caller resolved to `Interviewer`
    pub fn require_interviewer(&self, action: &str) -> Result<()> {
        match self.require_resolved()? {
            Role::Interviewer => Ok(()),
            Role::Candidate => Err(SessionError::not_authorized(
                self.identity.as_str(),
                action,
            )),
        }
    }
}

/// Directory backed by a fixed list of interviewers.
///
/// Identities listed as pending report a lookup that has not completed yet.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    interviewers: HashSet<Identity>,
    pending: HashSet<Identity>,
}

impl StaticDirectory {
    pub fn new<I, P>(interviewers: I, pending: P) -> Self
    where
        I: IntoIterator<Item = Identity>,
        P: IntoIterator<Item = Identity>,
    {
        Self {
            interviewers: interviewers.into_iter().collect(),
            pending: pending.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RoleResolver for StaticDirectory {
    async fn resolve_role(&self, identity: &Identity) -> RoleLookup {
        if self.pending.contains(identity) {
            RoleLookup::Pending
        } else if self.interviewers.contains(identity) {
            RoleLookup::Resolved(Role::Interviewer)
        } else {
            RoleLookup::Resolved(Role::Candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_resolves_roles() {
        let dir = StaticDirectory::new(vec!["alice".into()], vec!["carol".into()]);

        assert_eq!(
            dir.resolve_role(&"alice".into()).await,
            RoleLookup::Resolved(Role::Interviewer)
        );
        assert_eq!(
            dir.resolve_role(&"bob".into()).await,
            RoleLookup::Resolved(Role::Candidate)
        );
        assert_eq!(dir.resolve_role(&"carol".into()).await, RoleLookup::Pending);
    }

    #[test]
    fn pending_role_is_neither_allowed_nor_denied() {
        let caller = Caller::new("carol", RoleLookup::Pending);
        let err = caller.require_interviewer("schedule").unwrap_err();
        assert!(matches!(err, SessionError::RolePending { .. }));
    }

    #[test]
    fn candidate_cannot_act_as_interviewer() {
        let err = Caller::candidate("bob")
            .require_interviewer("schedule")
            .unwrap_err();
        assert!(matches!(err, SessionError::NotAuthorized { .. }));
    }
}
