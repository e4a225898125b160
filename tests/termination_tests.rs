//! Integration tests for ending a session

mod common;

use common::{alice, bob, Fixture};
use interview_room::session::{
    Caller, Identity, Phase, PersistedStatus, RoleLookup, SessionEvent,
};
use interview_room::termination::TerminationState;
use interview_room::SessionError;

#[tokio::test]
async fn commit_retries_until_completion_sticks() {
    let fx = Fixture::new();
    let session = fx.live_interview().await;
    let mut host = fx
        .orchestrator
        .join(session.id, &alice(), "Alice")
        .await
        .unwrap();
    fx.orchestrator
        .join(session.id, &bob(), "Bob")
        .await
        .unwrap();
    fx.store.fail_next(2);

    let state = fx
        .orchestrator
        .request_termination(session.id, &alice())
        .await
        .unwrap();

    assert_eq!(state, TerminationState::Ended);
    assert_eq!(fx.store.status_writes(), 3);
    assert_eq!(fx.store.status(session.id).await, PersistedStatus::Completed);
    assert_eq!(fx.transport.end_calls(), 1);
    assert!(fx.transport.inner.is_ended(session.call_id).await);
    assert_eq!(fx.orchestrator.phase(session.id).await.unwrap(), Phase::Completed);
    assert!(fx
        .orchestrator
        .roster(session.id)
        .await
        .unwrap()
        .participants
        .is_empty());

    // bob's join, Ending, one departure per participant, then Ended
    let mut terminations = Vec::new();
    let mut departures = Vec::new();
    while let Ok(envelope) = host.events.try_recv() {
        match envelope.event {
            SessionEvent::Termination(state) => terminations.push(state),
            SessionEvent::ParticipantLeft {
                roster_version,
                identity,
            } => {
                assert_eq!(terminations, [TerminationState::Ending]);
                departures.push((roster_version, identity.to_string()));
            }
            _ => {}
        }
    }
    assert_eq!(
        terminations,
        [TerminationState::Ending, TerminationState::Ended]
    );
    assert_eq!(
        departures,
        [(3, "alice".to_string()), (4, "bob".to_string())]
    );
    assert_eq!(fx.orchestrator.roster(session.id).await.unwrap().version, 4);
}

#[tokio::test]
async fn candidate_cannot_end_session() {
    let fx = Fixture::new();
    let session = fx.live_interview().await;
    fx.orchestrator
        .join(session.id, &bob(), "Bob")
        .await
        .unwrap();

    let err = fx
        .orchestrator
        .request_termination(session.id, &bob())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::NotAuthorized { .. }));
    assert_eq!(fx.transport.end_calls(), 0);
    assert_eq!(fx.store.status_writes(), 0);
    assert_eq!(
        fx.orchestrator.termination_state(session.id).await.unwrap(),
        TerminationState::Active
    );
    assert_eq!(fx.orchestrator.roster(session.id).await.unwrap().participants.len(), 1);
}

#[tokio::test]
async fn host_with_pending_role_is_suspended() {
    let fx = Fixture::new();
    let session = fx.live_interview().await;
    let pending_host = Caller::new("alice", RoleLookup::Pending);

    let err = fx
        .orchestrator
        .request_termination(session.id, &pending_host)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::RolePending { .. }));
    assert_eq!(fx.transport.end_calls(), 0);
}

#[tokio::test]
async fn failed_stop_returns_to_active_without_commit() {
    let fx = Fixture::new();
    let session = fx.live_interview().await;
    fx.orchestrator
        .join(session.id, &bob(), "Bob")
        .await
        .unwrap();
    fx.transport.refuse_end(true);

    let err = fx
        .orchestrator
        .request_termination(session.id, &alice())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::TerminationFailed { .. }));
    assert_eq!(fx.store.status_writes(), 0);
    assert_eq!(fx.store.status(session.id).await, PersistedStatus::Scheduled);
    assert_eq!(
        fx.orchestrator.termination_state(session.id).await.unwrap(),
        TerminationState::Active
    );
    assert_eq!(fx.orchestrator.phase(session.id).await.unwrap(), Phase::Live);
    assert_eq!(fx.orchestrator.roster(session.id).await.unwrap().participants.len(), 1);

    // The host may simply try again
    fx.transport.refuse_end(false);
    let state = fx
        .orchestrator
        .request_termination(session.id, &alice())
        .await
        .unwrap();
    assert_eq!(state, TerminationState::Ended);
}

#[tokio::test]
async fn exhausted_commit_is_retried_without_stopping_again() {
    let fx = Fixture::with_attempts(3);
    let session = fx.live_interview().await;
    fx.store.fail_next(10);

    let err = fx
        .orchestrator
        .request_termination(session.id, &alice())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::TerminationFailed { .. }));
    assert_eq!(fx.store.status_writes(), 3);
    assert_eq!(fx.transport.end_calls(), 1);
    assert_eq!(
        fx.orchestrator.termination_state(session.id).await.unwrap(),
        TerminationState::EndFailed
    );

    // Media is already down; nobody may rejoin while completion is unrecorded
    let err = fx
        .orchestrator
        .join(session.id, &bob(), "Bob")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TerminationInProgress));

    fx.store.fail_next(0);
    let state = fx
        .orchestrator
        .request_termination(session.id, &alice())
        .await
        .unwrap();

    assert_eq!(state, TerminationState::Ended);
    assert_eq!(fx.transport.end_calls(), 1);
    assert_eq!(fx.store.status(session.id).await, PersistedStatus::Completed);
}

#[tokio::test]
async fn ending_twice_is_harmless() {
    let fx = Fixture::new();
    let session = fx.live_interview().await;

    for _ in 0..2 {
        let state = fx
            .orchestrator
            .request_termination(session.id, &alice())
            .await
            .unwrap();
        assert_eq!(state, TerminationState::Ended);
    }

    assert_eq!(fx.transport.end_calls(), 1);
    assert_eq!(fx.store.status_writes(), 1);
}

#[tokio::test]
async fn completed_session_refuses_joins() {
    let fx = Fixture::new();
    let session = fx.live_interview().await;
    fx.orchestrator
        .join(session.id, &alice(), "Alice")
        .await
        .unwrap();
    fx.orchestrator
        .post_chat_message(session.id, &Identity::from("alice"), "thanks, that's all")
        .await
        .unwrap();
    fx.orchestrator
        .request_termination(session.id, &alice())
        .await
        .unwrap();

    assert!(fx
        .orchestrator
        .chat_history(session.id)
        .await
        .unwrap()
        .is_empty());
    let err = fx
        .orchestrator
        .post_chat_message(session.id, &Identity::from("alice"), "one more thing")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotAdmitted { .. }));

    let err = fx
        .orchestrator
        .join(session.id, &bob(), "Bob")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::SessionNotLive {
            phase: Phase::Completed
        }
    ));
}
