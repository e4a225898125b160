//! Shared fixtures: scripted collaborators and a ready-to-join interview
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use interview_room::external::{
    CallHandle, CallTransport, InterviewStore, LocalCallTransport, MemoryStore, StoreError,
    Telemetry, TransportError,
};
use interview_room::orchestrator::{OrchestratorConfig, SessionOrchestrator};
use interview_room::session::{
    Caller, CallId, Identity, NewInterview, PersistedStatus, Session, SessionId,
};
use interview_room::termination::RetryPolicy;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Memory store whose writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failures_left: AtomicU32,
    status_writes: AtomicU32,
    refuse_create: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` status writes
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Make `create_interview` fail until called with false
    pub fn refuse_create(&self, refuse: bool) {
        self.refuse_create.store(refuse, Ordering::SeqCst);
    }

    pub fn status_writes(&self) -> u32 {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub async fn status(&self, id: SessionId) -> PersistedStatus {
        self.inner.get_interview(id).await.unwrap().status
    }
}

#[async_trait]
impl InterviewStore for FlakyStore {
    async fn create_interview(&self, session: Session) -> Result<SessionId, StoreError> {
        if self.refuse_create.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.create_interview(session).await
    }

    async fn set_status(&self, id: SessionId, status: PersistedStatus) -> Result<(), StoreError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.set_status(id, status).await
    }

    async fn get_interview(&self, id: SessionId) -> Result<Session, StoreError> {
        self.inner.get_interview(id).await
    }

    async fn find_by_call(&self, call_id: CallId) -> Result<Option<Session>, StoreError> {
        self.inner.find_by_call(call_id).await
    }

    async fn list_interviews_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<Session>, StoreError> {
        self.inner.list_interviews_for_identity(identity).await
    }
}

/// Local transport that counts stop requests and can refuse them
#[derive(Default)]
pub struct CountingTransport {
    pub inner: LocalCallTransport,
    end_calls: AtomicU32,
    fail_end: AtomicBool,
}

impl CountingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_end(&self, refuse: bool) {
        self.fail_end.store(refuse, Ordering::SeqCst);
    }

    pub fn end_calls(&self) -> u32 {
        self.end_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallTransport for CountingTransport {
    async fn create_call(&self, session_id: SessionId) -> Result<CallHandle, TransportError> {
        self.inner.create_call(session_id).await
    }

    async fn join(&self, call: &CallHandle, identity: &Identity) -> Result<(), TransportError> {
        self.inner.join(call, identity).await
    }

    async fn end_call(&self, call: &CallHandle) -> Result<(), TransportError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("media server down".into()));
        }
        self.inner.end_call(call).await
    }

    fn telemetry(&self) -> Option<broadcast::Receiver<Telemetry>> {
        self.inner.telemetry()
    }
}

pub struct Fixture {
    pub store: Arc<FlakyStore>,
    pub transport: Arc<CountingTransport>,
    pub orchestrator: Arc<SessionOrchestrator>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_attempts(5)
    }

    /// Fixture whose completion commit gives up after `max_attempts`
    pub fn with_attempts(max_attempts: u32) -> Self {
        let store = Arc::new(FlakyStore::new());
        let transport = Arc::new(CountingTransport::new());
        let config = OrchestratorConfig {
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                multiplier: 2.0,
            },
            ..OrchestratorConfig::default()
        };
        let orchestrator = Arc::new(SessionOrchestrator::new(
            store.clone(),
            transport.clone(),
            config,
        ));
        Self {
            store,
            transport,
            orchestrator,
        }
    }

    /// An interview hosted by alice with bob invited, started a minute ago
    pub async fn live_interview(&self) -> Session {
        self.orchestrator
            .schedule(
                &alice(),
                NewInterview {
                    title: "Backend pairing".into(),
                    description: None,
                    scheduled_start: Utc::now() - ChronoDuration::minutes(1),
                    invited: vec![Identity::from("bob")],
                },
            )
            .await
            .unwrap()
    }
}

pub fn alice() -> Caller {
    Caller::interviewer("alice")
}

pub fn bob() -> Caller {
    Caller::candidate("bob")
}

pub fn eve() -> Caller {
    Caller::candidate("eve")
}
