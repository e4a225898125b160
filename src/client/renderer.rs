//! Plain-text rendering of server state for the terminal

use crate::chat::ChatMessage;
use crate::orchestrator::{JoinSnapshot, RosterSnapshot};
use crate::roster::Participant;
use crate::session::{SessionEvent, SessionSummary};
use crate::termination::TerminationState;
use crate::workspace::WorkspaceState;

pub fn interview_line(summary: &SessionSummary) -> String {
    let s = &summary.session;
    format!(
        "{:<10} {}  {}  call={}  host={}",
        summary.phase.to_string(),
        s.scheduled_start.format("%Y-%m-%d %H:%M"),
        s.title,
        s.call_id,
        s.host
    )
}

pub fn participant_line(p: &Participant) -> String {
    let mut flags = Vec::new();
    if p.attributes.speaking {
        flags.push("speaking");
    }
    if !p.attributes.audio_enabled {
        flags.push("muted");
    }
    if p.attributes.video_enabled {
        flags.push("video");
    }
    format!(
        "{} ({}, {:?}){}",
        p.display_name,
        p.identity,
        p.role,
        if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        }
    )
}

pub fn chat_line(m: &ChatMessage) -> String {
    format!(
        "[{}] #{} {}: {}",
        m.created_at.format("%H:%M:%S"),
        m.sequence,
        m.sender_name,
        m.body
    )
}

pub fn workspace_block(w: &WorkspaceState) -> String {
    let author = w
        .updated_by
        .as_ref()
        .map(|i| format!(" by {}", i))
        .unwrap_or_default();
    format!(
        "--- {} / {} (revision {}{}) ---\n{}",
        w.question_id, w.language, w.revision, author, w.code
    )
}

pub fn roster_block(r: &RosterSnapshot) -> String {
    let mut out = format!("Participants (version {}):", r.version);
    for p in &r.participants {
        out.push_str("\n  ");
        out.push_str(&participant_line(p));
    }
    out
}

pub fn snapshot_block(snapshot: &JoinSnapshot) -> String {
    let mut out = format!(
        "Joined '{}' as {}\n{}\n{}",
        snapshot.session.title,
        snapshot.participant.display_name,
        roster_block(&snapshot.roster),
        workspace_block(&snapshot.workspace)
    );
    for m in &snapshot.chat_history {
        out.push('\n');
        out.push_str(&chat_line(m));
    }
    out
}

pub fn termination_line(state: TerminationState) -> &'static str {
    match state {
        TerminationState::Active => "session is active",
        TerminationState::Ending => "session is ending",
        TerminationState::Ended => "session has ended",
        TerminationState::EndFailed => "call stopped but completion was not recorded; retry `end`",
    }
}

pub fn event_line(event: &SessionEvent) -> String {
    match event {
        SessionEvent::ParticipantJoined { participant, .. } => {
            format!("+ {}", participant_line(participant))
        }
        SessionEvent::ParticipantLeft { identity, .. } => format!("- {} left", identity),
        SessionEvent::ParticipantUpdated { participant, .. } => {
            format!("~ {}", participant_line(participant))
        }
        SessionEvent::WorkspaceChanged(state) => workspace_block(state),
        SessionEvent::ChatPosted(message) => chat_line(message),
        SessionEvent::Termination(state) => format!("* {}", termination_line(*state)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{ConnectionStatus, ParticipantAttributes, ParticipantRole};
    use crate::session::Identity;
    use chrono::Utc;

    fn participant() -> Participant {
        Participant {
            identity: Identity::from("bob"),
            display_name: "Bob".into(),
            role: ParticipantRole::Candidate,
            status: ConnectionStatus::Connected,
            attributes: ParticipantAttributes::default(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn default_attributes_render_without_flags() {
        assert_eq!(participant_line(&participant()), "Bob (bob, Candidate)");
    }

    #[test]
    fn muted_speaker_shows_both_flags() {
        let mut p = participant();
        p.attributes.speaking = true;
        p.attributes.audio_enabled = false;
        assert!(participant_line(&p).ends_with("[speaking, muted]"));
    }

    #[test]
    fn departure_names_identity() {
        let event = SessionEvent::ParticipantLeft {
            roster_version: 3,
            identity: Identity::from("bob"),
        };
        assert_eq!(event_line(&event), "- bob left");
    }
}
