//! Unix socket listener and server main loop

use super::connection::{client_writer_task, create_welcome_message, ClientConnection};
use crate::error::{ErrorKind, SessionError};
use crate::external::Telemetry;
use crate::orchestrator::SessionOrchestrator;
use crate::protocol::{
    check_version_compatibility, read_message, ClientMessage, ServerMessage, PROTOCOL_VERSION,
};
use crate::session::{Caller, RoleResolver, SessionId};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// State shared by every connection
struct ServerContext {
    server_id: Uuid,
    orchestrator: Arc<SessionOrchestrator>,
    resolver: Arc<dyn RoleResolver>,
}

/// Unix socket server listener
pub struct ServerListener {
    socket_path: PathBuf,
    name: String,
    orchestrator: Arc<SessionOrchestrator>,
    resolver: Arc<dyn RoleResolver>,
    telemetry: Option<broadcast::Receiver<Telemetry>>,
}

impl ServerListener {
    /// Create a new server listener
    pub fn new(
        name: String,
        socket_path: PathBuf,
        orchestrator: Arc<SessionOrchestrator>,
        resolver: Arc<dyn RoleResolver>,
    ) -> Self {
        Self {
            socket_path,
            name,
            orchestrator,
            resolver,
            telemetry: None,
        }
    }

    /// Feed call-transport telemetry into participant attributes
    pub fn with_telemetry(mut self, telemetry: Option<broadcast::Receiver<Telemetry>>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Run the server
    pub async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Remove stale socket if it exists
        if self.socket_path.exists() {
            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => {
                    return Err(anyhow!("Server '{}' is already running", self.name));
                }
                Err(_) => {
                    tracing::info!("Removing stale socket: {:?}", self.socket_path);
                    std::fs::remove_file(&self.socket_path)?;
                }
            }
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Server listening on {:?}", self.socket_path);

        let context = Arc::new(ServerContext {
            server_id: Uuid::new_v4(),
            orchestrator: Arc::clone(&self.orchestrator),
            resolver: Arc::clone(&self.resolver),
        });

        if let Some(telemetry) = self.telemetry.take() {
            tokio::spawn(pump_telemetry(telemetry, Arc::clone(&self.orchestrator)));
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let context = Arc::clone(&context);
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, context).await {
                                    tracing::error!("Client error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        self.cleanup();

        Ok(())
    }

    /// Clean up server resources
    fn cleanup(&self) {
        tracing::info!("Cleaning up server resources");

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::error!("Failed to remove socket file: {}", e);
            }
        }
    }
}

/// Apply transport telemetry until the transport goes away
async fn pump_telemetry(
    mut telemetry: broadcast::Receiver<Telemetry>,
    orchestrator: Arc<SessionOrchestrator>,
) {
    loop {
        match telemetry.recv().await {
            Ok(t) => {
                if let Err(e) = orchestrator
                    .apply_telemetry(t.call_id, &t.identity, t.update)
                    .await
                {
                    tracing::debug!(call_id = %t.call_id, identity = %t.identity, "Ignored telemetry: {}", e);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Telemetry lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("Telemetry pump finished");
}

/// Handle a single client connection
async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
    let (mut reader, writer) = stream.into_split();

    let (tx, rx) = mpsc::channel::<ServerMessage>(256);
    let mut client = ClientConnection::new(tx);
    let client_id = client.id();

    tracing::info!("Client connected: {}", client_id);

    let writer_handle = tokio::spawn(client_writer_task(writer, rx));

    client
        .send(create_welcome_message(context.server_id))
        .await?;

    loop {
        match read_message::<_, ClientMessage>(&mut reader).await {
            Ok(Some(ClientMessage::Detach)) => {
                tracing::info!("Client {} requested detach", client_id);
                leave_joined(&mut client, &context).await;
                let _ = client.send(ServerMessage::ack("Detach")).await;
                break;
            }
            Ok(Some(msg)) => {
                let response = process_message(msg, &mut client, &context).await;
                if let Err(e) = client.send(response).await {
                    tracing::error!("Failed to send response: {}", e);
                    break;
                }
            }
            Ok(None) => {
                tracing::info!("Client disconnected: {}", client_id);
                break;
            }
            Err(e) => {
                tracing::error!("Error reading from client: {}", e);
                let _ = client
                    .send(ServerMessage::error(
                        ErrorKind::Protocol,
                        format!("Invalid message: {}", e),
                    ))
                    .await;
                break;
            }
        }
    }

    leave_joined(&mut client, &context).await;

    // Let queued responses drain before the writer goes away
    drop(client);
    let _ = writer_handle.await;

    tracing::info!("Client handler finished: {}", client_id);

    Ok(())
}

async fn leave_joined(client: &mut ClientConnection, context: &ServerContext) {
    if let (Some(session_id), Some(caller)) = (client.detach(), client.caller()) {
        context
            .orchestrator
            .leave(session_id, &caller.identity)
            .await;
    }
}

/// Process a client message and return the response
async fn process_message(
    msg: ClientMessage,
    client: &mut ClientConnection,
    context: &ServerContext,
) -> ServerMessage {
    if let ClientMessage::Hello {
        protocol_version,
        identity,
        display_name,
    } = msg
    {
        if let Err(e) = check_version_compatibility(protocol_version, PROTOCOL_VERSION) {
            return ServerMessage::error(ErrorKind::Protocol, e.to_string());
        }
        let caller = Caller::resolve(identity, context.resolver.as_ref()).await;
        let name = display_name.unwrap_or_else(|| caller.identity.to_string());
        tracing::info!(client_id = %client.id(), identity = %caller.identity, role = ?caller.role, "Client identified");
        let response = ServerMessage::Identified {
            identity: caller.identity.clone(),
            role: caller.role,
        };
        client.identify(caller, name);
        return response;
    }

    let Some(caller) = client.caller().cloned() else {
        return ServerMessage::error(ErrorKind::Protocol, "Hello required before other commands");
    };

    match dispatch(msg, &caller, client, &context.orchestrator).await {
        Ok(response) => response,
        Err(e) => {
            if e.is_recoverable() {
                tracing::debug!(client_id = %client.id(), identity = %caller.identity, "Command failed: {}", e);
            } else {
                tracing::info!(client_id = %client.id(), identity = %caller.identity, "Command refused: {}", e);
            }
            e.into()
        }
    }
}

fn require_joined(client: &ClientConnection, caller: &Caller) -> crate::Result<SessionId> {
    client
        .joined_session()
        .ok_or_else(|| SessionError::NotAdmitted {
            identity: caller.identity.to_string(),
        })
}

/// Run a command for an identified client
async fn dispatch(
    msg: ClientMessage,
    caller: &Caller,
    client: &mut ClientConnection,
    orchestrator: &SessionOrchestrator,
) -> crate::Result<ServerMessage> {
    let response = match msg {
        ClientMessage::Hello { .. } | ClientMessage::Detach => ServerMessage::ack("Noop"),

        ClientMessage::Schedule { interview } => ServerMessage::Scheduled {
            session: orchestrator.schedule(caller, interview).await?,
        },

        ClientMessage::ListInterviews => ServerMessage::Interviews {
            interviews: orchestrator.list_interviews(&caller.identity).await?,
        },

        ClientMessage::FindByCall { call_id } => ServerMessage::Interview {
            session: orchestrator.find_by_call(call_id).await?,
        },

        ClientMessage::Join { session_id } => {
            // The new connection is counted before the previous one is released
            let ticket = orchestrator
                .join(session_id, caller, client.display_name())
                .await?;
            if let Some(previous) = client.detach() {
                orchestrator.leave(previous, &caller.identity).await;
            }
            client.attach(session_id, ticket.events);
            ServerMessage::Joined(Box::new(ticket.snapshot))
        }

        ClientMessage::Leave => {
            if let Some(session_id) = client.detach() {
                orchestrator.leave(session_id, &caller.identity).await;
            }
            ServerMessage::ack("Leave")
        }

        ClientMessage::GetPhase => ServerMessage::Phase {
            phase: orchestrator.phase(require_joined(client, caller)?).await?,
        },

        ClientMessage::GetRoster => {
            ServerMessage::Roster(orchestrator.roster(require_joined(client, caller)?).await?)
        }

        ClientMessage::GetWorkspace => {
            ServerMessage::Workspace(orchestrator.workspace(require_joined(client, caller)?).await?)
        }

        ClientMessage::GetHistory { after } => ServerMessage::History {
            messages: orchestrator
                .chat_history_since(require_joined(client, caller)?, after)
                .await?,
        },

        ClientMessage::ProposeEdit {
            edit,
            known_revision,
        } => ServerMessage::EditAccepted(
            orchestrator
                .propose_workspace_edit(
                    require_joined(client, caller)?,
                    &caller.identity,
                    edit,
                    known_revision,
                )
                .await?,
        ),

        ClientMessage::PostChat { body } => ServerMessage::ChatAccepted(
            orchestrator
                .post_chat_message(require_joined(client, caller)?, &caller.identity, &body)
                .await?,
        ),

        ClientMessage::UpdateAttributes { update } => ServerMessage::AttributesUpdated(
            orchestrator
                .update_attributes(require_joined(client, caller)?, &caller.identity, update)
                .await?,
        ),

        ClientMessage::RequestTermination { session_id } => ServerMessage::TerminationResult {
            state: orchestrator.request_termination(session_id, caller).await?,
        },
    };

    Ok(response)
}
