//! CLI commands built on [`Client`]

use super::renderer;
use super::{Client, Notification, ServerError};
use crate::error::ErrorKind;
use crate::orchestrator::JoinSnapshot;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{CallId, EventCursor, Identity, NewInterview, SessionEvent, SessionId};
use crate::termination::TerminationState;
use crate::workspace::{Language, WorkspaceEdit, WorkspaceState};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Stale-revision retries before `code` gives up
const EDIT_ATTEMPTS: usize = 3;

pub struct ScheduleArgs {
    pub title: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub invite: Vec<String>,
}

pub async fn schedule(client: &mut Client, args: ScheduleArgs) -> Result<()> {
    let interview = NewInterview {
        title: args.title,
        description: args.description,
        scheduled_start: args.start.unwrap_or_else(Utc::now),
        invited: args.invite.into_iter().map(Identity::new).collect(),
    };

    match client.request(ClientMessage::Schedule { interview }).await? {
        ServerMessage::Scheduled { session } => {
            println!("Scheduled '{}'", session.title);
            println!("  session: {}", session.id);
            println!("  call:    {}", session.call_id);
            println!("  starts:  {}", session.scheduled_start);
            Ok(())
        }
        other => bail!("Unexpected response: {:?}", other),
    }
}

/// Print interviews as a table, or as JSON for scripts
pub async fn list(client: &mut Client, json: bool) -> Result<()> {
    let interviews = match client.request(ClientMessage::ListInterviews).await? {
        ServerMessage::Interviews { interviews } => interviews,
        other => bail!("Unexpected response: {:?}", other),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&interviews)?);
    } else if interviews.is_empty() {
        println!("No interviews found.");
    } else {
        for summary in &interviews {
            println!("{}", renderer::interview_line(summary));
        }
    }
    Ok(())
}

/// Session behind `call_id`
async fn find(client: &mut Client, call_id: &str) -> Result<SessionId> {
    let call_id = CallId::parse(call_id).with_context(|| format!("Invalid call id '{}'", call_id))?;

    match client.request(ClientMessage::FindByCall { call_id }).await? {
        ServerMessage::Interview { session } => Ok(session.id),
        other => bail!("Unexpected response: {:?}", other),
    }
}

/// Join the interview behind `call_id`
async fn join(client: &mut Client, call_id: &str) -> Result<JoinSnapshot> {
    let session_id = find(client, call_id).await?;

    match client.request(ClientMessage::Join { session_id }).await? {
        ServerMessage::Joined(snapshot) => Ok(*snapshot),
        other => bail!("Unexpected response: {:?}", other),
    }
}

/// Join and print the session until it ends or the user interrupts
pub async fn watch(mut client: Client, call_id: &str) -> Result<()> {
    let snapshot = join(&mut client, call_id).await?;
    println!("{}", renderer::snapshot_block(&snapshot));
    let mut cursor = snapshot.cursor();

    loop {
        let notification = tokio::select! {
            n = client.next_notification() => n?,
            _ = tokio::signal::ctrl_c() => break,
        };

        match notification {
            Some(Notification::Event(envelope)) => {
                if !cursor.accept(&envelope.event) {
                    continue;
                }
                println!("{}", renderer::event_line(&envelope.event));
                if envelope.event == SessionEvent::Termination(TerminationState::Ended) {
                    return Ok(());
                }
            }
            Some(Notification::Resync { missed }) => {
                println!("! missed {} updates, refreshing", missed);
                cursor = refresh(&mut client, cursor).await?;
            }
            None => {
                println!("Server closed the connection.");
                return Ok(());
            }
        }
    }

    if let Err(e) = client.detach().await {
        tracing::debug!("Detach after interrupt failed: {}", e);
    }
    Ok(())
}

/// Re-read roster and workspace, and fetch chat missed since `cursor`
async fn refresh(client: &mut Client, cursor: EventCursor) -> Result<EventCursor> {
    let roster = match client.request(ClientMessage::GetRoster).await? {
        ServerMessage::Roster(roster) => roster,
        other => bail!("Unexpected response: {:?}", other),
    };
    let workspace = match client.request(ClientMessage::GetWorkspace).await? {
        ServerMessage::Workspace(state) => state,
        other => bail!("Unexpected response: {:?}", other),
    };
    let missed = match client
        .request(ClientMessage::GetHistory {
            after: cursor.sequence(),
        })
        .await?
    {
        ServerMessage::History { messages } => messages,
        other => bail!("Unexpected response: {:?}", other),
    };

    println!("{}", renderer::roster_block(&roster));
    println!("{}", renderer::workspace_block(&workspace));
    for message in &missed {
        println!("{}", renderer::chat_line(message));
    }
    let last_sequence = missed.last().map_or(cursor.sequence(), |m| m.sequence);

    Ok(EventCursor::from_snapshot(
        roster.version,
        workspace.revision,
        last_sequence,
    ))
}

pub async fn say(mut client: Client, call_id: &str, text: &str) -> Result<()> {
    join(&mut client, call_id).await?;
    match client
        .request(ClientMessage::PostChat {
            body: text.to_string(),
        })
        .await?
    {
        ServerMessage::ChatAccepted(message) => println!("{}", renderer::chat_line(&message)),
        other => bail!("Unexpected response: {:?}", other),
    }
    client.detach().await
}

pub struct CodeArgs {
    pub question: Option<String>,
    pub language: Option<String>,
    pub file: Option<PathBuf>,
}

/// Apply question, language and code edits in that order
pub async fn code(mut client: Client, call_id: &str, args: CodeArgs) -> Result<()> {
    let snapshot = join(&mut client, call_id).await?;

    let mut edits = Vec::new();
    if let Some(question) = args.question {
        edits.push(WorkspaceEdit::Question(question));
    }
    if let Some(language) = args.language {
        let language: Language = language.parse().map_err(|e: String| anyhow!(e))?;
        edits.push(WorkspaceEdit::Language(language));
    }
    if let Some(path) = args.file {
        let code = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        edits.push(WorkspaceEdit::Code(code));
    }

    let mut state = snapshot.workspace;
    for edit in edits {
        state = propose(&mut client, edit, state.revision).await?;
    }

    println!("{}", renderer::workspace_block(&state));
    client.detach().await
}

/// Propose `edit`, refreshing the revision when another participant got there first
async fn propose(client: &mut Client, edit: WorkspaceEdit, known_revision: u64) -> Result<WorkspaceState> {
    let mut known_revision = known_revision;
    for _ in 0..EDIT_ATTEMPTS {
        let msg = ClientMessage::ProposeEdit {
            edit: edit.clone(),
            known_revision,
        };
        match client.request(msg).await {
            Ok(ServerMessage::EditAccepted(state)) => return Ok(state),
            Ok(other) => bail!("Unexpected response: {:?}", other),
            Err(e)
                if ServerError::from_anyhow(&e).map(|s| s.kind)
                    == Some(ErrorKind::StaleRevision) =>
            {
                tracing::debug!("Stale revision {}, refreshing", known_revision);
                match client.request(ClientMessage::GetWorkspace).await? {
                    ServerMessage::Workspace(state) => known_revision = state.revision,
                    other => bail!("Unexpected response: {:?}", other),
                }
            }
            Err(e) => return Err(e),
        }
    }
    bail!("Workspace kept changing; gave up after {} attempts", EDIT_ATTEMPTS)
}

/// End the session; the host does not need to be in the call
pub async fn end(mut client: Client, call_id: &str) -> Result<()> {
    let session_id = find(&mut client, call_id).await?;
    match client
        .request(ClientMessage::RequestTermination { session_id })
        .await?
    {
        ServerMessage::TerminationResult { state } => {
            println!("{}", renderer::termination_line(state))
        }
        other => bail!("Unexpected response: {:?}", other),
    }
    client.detach().await
}
