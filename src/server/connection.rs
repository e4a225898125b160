//! Client connection handling

use crate::protocol::{write_frame, ServerMessage, PROTOCOL_VERSION};
use crate::session::{Caller, EventEnvelope, SessionId};
use anyhow::{anyhow, Result};
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Represents a connected client
pub struct ClientConnection {
    /// Unique connection identifier
    id: Uuid,

    /// Channel to send messages to this client
    sender: mpsc::Sender<ServerMessage>,

    /// Identity established by `Hello`
    caller: Option<Caller>,

    display_name: String,

    /// Session joined by this connection, with its event forwarder
    joined: Option<(SessionId, JoinHandle<()>)>,
}

impl ClientConnection {
    /// Create a new client connection
    pub fn new(sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            caller: None,
            display_name: String::new(),
            joined: None,
        }
    }

    /// Get connection ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Send a message to the client
    pub async fn send(&self, msg: ServerMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| anyhow!("Failed to send message to client"))
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn identify(&mut self, caller: Caller, display_name: String) {
        self.caller = Some(caller);
        self.display_name = display_name;
    }

    pub fn joined_session(&self) -> Option<SessionId> {
        self.joined.as_ref().map(|(id, _)| *id)
    }

    /// Record the joined session and start forwarding its events
    pub fn attach(&mut self, session_id: SessionId, events: broadcast::Receiver<EventEnvelope>) {
        let forwarder = tokio::spawn(forward_events(self.id, events, self.sender.clone()));
        if let Some((_, previous)) = self.joined.replace((session_id, forwarder)) {
            previous.abort();
        }
    }

    /// Stop forwarding events; returns the session that was joined
    pub fn detach(&mut self) -> Option<SessionId> {
        self.joined.take().map(|(id, forwarder)| {
            forwarder.abort();
            id
        })
    }
}

/// Relay session events to one client.
///
/// A client that falls behind the broadcast buffer gets a `Resync` notice
/// instead of the dropped events.
async fn forward_events(
    client_id: Uuid,
    mut events: broadcast::Receiver<EventEnvelope>,
    sender: mpsc::Sender<ServerMessage>,
) {
    loop {
        let msg = match events.recv().await {
            Ok(envelope) => ServerMessage::Event(envelope),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(%client_id, missed, "Client lagged behind session events");
                ServerMessage::Resync { missed }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if sender.send(msg).await.is_err() {
            break;
        }
    }
    tracing::debug!(%client_id, "Event forwarder finished");
}

/// Task to write outgoing messages to the client
pub async fn client_writer_task(
    mut writer: OwnedWriteHalf,
    mut receiver: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = receiver.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            tracing::error!("Failed to write message to client: {}", e);
            break;
        }
    }

    tracing::debug!("Client writer task finished");
}

/// Create a welcome message for a new client
pub fn create_welcome_message(server_id: Uuid) -> ServerMessage {
    ServerMessage::Welcome {
        server_id,
        protocol_version: PROTOCOL_VERSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionEvent;
    use crate::termination::TerminationState;

    fn envelope() -> EventEnvelope {
        EventEnvelope {
            session_id: SessionId::new(),
            event: SessionEvent::Termination(TerminationState::Ending),
        }
    }

    #[tokio::test]
    async fn lagging_client_gets_resync_notice() {
        let (events_tx, events_rx) = broadcast::channel(2);
        for _ in 0..5 {
            events_tx.send(envelope()).unwrap();
        }

        let (tx, mut rx) = mpsc::channel(16);
        let forwarder = tokio::spawn(forward_events(Uuid::new_v4(), events_rx, tx));

        assert!(matches!(rx.recv().await, Some(ServerMessage::Resync { missed: 3 })));
        assert!(matches!(rx.recv().await, Some(ServerMessage::Event(_))));
        assert!(matches!(rx.recv().await, Some(ServerMessage::Event(_))));

        drop(events_tx);
        forwarder.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
