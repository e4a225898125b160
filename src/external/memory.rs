//! In-process collaborators used by the daemon and the tests

use super::{
    CallHandle, CallTransport, IdentityProvider, InterviewStore, StoreError, Telemetry,
    TransportError,
};
use crate::roster::AttributeUpdate;
use crate::session::{CallId, Identity, PersistedStatus, Session, SessionId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::{broadcast, RwLock};

/// Identity provider with a fixed answer
#[derive(Debug, Clone, Default)]
pub struct FixedIdentity(pub Option<Identity>);

impl IdentityProvider for FixedIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}

/// Interview store kept in memory.
///
/// Completion is terminal: once a record is completed, any attempt to move it
/// back is refused.
#[derive(Debug, Default)]
pub struct MemoryStore {
    interviews: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn create_interview(&self, session: Session) -> Result<SessionId, StoreError> {
        let id = session.id;
        self.interviews.write().await.insert(id, session);
        Ok(id)
    }

    async fn set_status(&self, id: SessionId, status: PersistedStatus) -> Result<(), StoreError> {
        let mut interviews = self.interviews.write().await;
        let session = interviews.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if session.is_completed() && status != PersistedStatus::Completed {
            return Err(StoreError::TerminalStatus(id));
        }
        session.status = status;
        Ok(())
    }

    async fn get_interview(&self, id: SessionId) -> Result<Session, StoreError> {
        self.interviews
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find_by_call(&self, call_id: CallId) -> Result<Option<Session>, StoreError> {
        Ok(self
            .interviews
            .read()
            .await
            .values()
            .find(|s| s.call_id == call_id)
            .cloned())
    }

    async fn list_interviews_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .interviews
            .read()
            .await
            .values()
            .filter(|s| s.admits(identity))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct CallRecord {
    members: HashSet<Identity>,
    ended: bool,
}

/// Call transport that only tracks call membership in memory
#[derive(Debug)]
pub struct LocalCallTransport {
    calls: RwLock<HashMap<CallId, CallRecord>>,
    telemetry: broadcast::Sender<Telemetry>,
}

impl Default for LocalCallTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCallTransport {
    pub fn new() -> Self {
        let (telemetry, _) = broadcast::channel(256);
        Self {
            calls: RwLock::new(HashMap::new()),
            telemetry,
        }
    }

    pub async fn is_ended(&self, call_id: CallId) -> bool {
        self.calls
            .read()
            .await
            .get(&call_id)
            .map(|c| c.ended)
            .unwrap_or(false)
    }

    pub async fn members(&self, call_id: CallId) -> Vec<Identity> {
        let calls = self.calls.read().await;
        let mut members: Vec<_> = calls
            .get(&call_id)
            .map(|c| c.members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Report a speaking/mute change for a call member
    pub fn publish(&self, call_id: CallId, identity: Identity, update: AttributeUpdate) {
        let _ = self.telemetry.send(Telemetry {
            call_id,
            identity,
            update,
        });
    }
}

#[async_trait]
impl CallTransport for LocalCallTransport {
    async fn create_call(&self, session_id: SessionId) -> Result<CallHandle, TransportError> {
        let call_id = CallId::new();
        self.calls
            .write()
            .await
            .insert(call_id, CallRecord::default());
        tracing::debug!(%session_id, %call_id, "Created call");
        Ok(CallHandle::new(call_id))
    }

    async fn join(&self, call: &CallHandle, identity: &Identity) -> Result<(), TransportError> {
        let mut calls = self.calls.write().await;
        let record = calls
            .get_mut(&call.call_id)
            .ok_or(TransportError::UnknownCall(call.call_id))?;
        if record.ended {
            return Err(TransportError::CallEnded(call.call_id));
        }
        record.members.insert(identity.clone());
        Ok(())
    }

    async fn end_call(&self, call: &CallHandle) -> Result<(), TransportError> {
        let mut calls = self.calls.write().await;
        let record = calls
            .get_mut(&call.call_id)
            .ok_or(TransportError::UnknownCall(call.call_id))?;
        record.ended = true;
        record.members.clear();
        tracing::info!(call_id = %call.call_id, "Call ended");
        Ok(())
    }

    fn telemetry(&self) -> Option<broadcast::Receiver<Telemetry>> {
        Some(self.telemetry.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(call_id: CallId) -> Session {
        Session {
            id: SessionId::new(),
            title: "Onsite".into(),
            description: None,
            scheduled_start: Utc::now(),
            host: "alice".into(),
            invited: vec!["bob".into()],
            call_id,
            status: PersistedStatus::Scheduled,
        }
    }

    #[tokio::test]
    async fn completed_status_is_terminal() {
        let store = MemoryStore::new();
        let id = store.create_interview(record(CallId::new())).await.unwrap();

        store.set_status(id, PersistedStatus::Completed).await.unwrap();
        store.set_status(id, PersistedStatus::Completed).await.unwrap();
        let err = store
            .set_status(id, PersistedStatus::Scheduled)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::TerminalStatus(_)));
        assert!(store.get_interview(id).await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn lists_only_interviews_involving_identity() {
        let store = MemoryStore::new();
        store.create_interview(record(CallId::new())).await.unwrap();

        assert_eq!(
            store
                .list_interviews_for_identity(&"bob".into())
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .list_interviews_for_identity(&"mallory".into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn ended_call_refuses_joins() {
        let transport = LocalCallTransport::new();
        let call = transport.create_call(SessionId::new()).await.unwrap();
        transport.join(&call, &"bob".into()).await.unwrap();
        assert_eq!(transport.members(call.call_id).await, vec![Identity::from("bob")]);

        transport.end_call(&call).await.unwrap();
        assert!(transport.is_ended(call.call_id).await);
        assert!(transport.members(call.call_id).await.is_empty());
        assert!(matches!(
            transport.join(&call, &"bob".into()).await,
            Err(TransportError::CallEnded(_))
        ));
    }
}
