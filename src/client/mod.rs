//! Client - command-line access to a running interview server

pub mod commands;
mod renderer;

use crate::config::Config;
use crate::error::ErrorKind;
use crate::external::IdentityProvider;
use crate::protocol::{read_message, write_frame, ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::session::{EventEnvelope, Identity, RoleLookup};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::sleep;

/// An error response from the server
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServerError {
    /// The `ServerError` behind `err`, if that is what it is
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&ServerError> {
        err.downcast_ref::<ServerError>()
    }
}

/// Something the server pushed without being asked
#[derive(Debug, Clone)]
pub enum Notification {
    Event(EventEnvelope),
    Resync { missed: u64 },
}

/// An identified connection to the server
pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    identity: Identity,
    role: RoleLookup,
    /// Notifications that arrived while waiting for a response
    pending: VecDeque<Notification>,
}

impl Client {
    /// Connect to `socket_path` and identify as `identity`
    pub async fn connect(
        socket_path: &Path,
        identity: Identity,
        display_name: Option<String>,
    ) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;
        Self::handshake(stream, identity, display_name).await
    }

    /// Perform the Welcome/Hello exchange on an open stream
    pub async fn handshake(
        stream: UnixStream,
        identity: Identity,
        display_name: Option<String>,
    ) -> Result<Self> {
        let (mut reader, mut writer) = stream.into_split();

        match read_message::<_, ServerMessage>(&mut reader).await? {
            Some(ServerMessage::Welcome {
                protocol_version, ..
            }) if protocol_version == PROTOCOL_VERSION => {}
            Some(ServerMessage::Welcome {
                protocol_version, ..
            }) => bail!(
                "Server speaks protocol {}, this client speaks {}",
                protocol_version,
                PROTOCOL_VERSION
            ),
            other => bail!("Unexpected greeting: {:?}", other),
        }

        let hello = ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            identity: identity.clone(),
            display_name,
        };
        write_frame(&mut writer, &hello).await?;

        let mut client = Self {
            reader,
            writer,
            identity,
            role: RoleLookup::Pending,
            pending: VecDeque::new(),
        };

        match client.receive_response().await? {
            ServerMessage::Identified { role, .. } => client.role = role,
            other => return Err(response_error(other)),
        }
        tracing::debug!(identity = %client.identity, role = ?client.role, "Connected to server");

        Ok(client)
    }

    pub fn role(&self) -> RoleLookup {
        self.role
    }

    /// Send `msg` and wait for its response.
    ///
    /// Error responses become `Err`; notifications arriving in between are
    /// queued for [`Client::next_notification`].
    pub async fn request(&mut self, msg: ClientMessage) -> Result<ServerMessage> {
        write_frame(&mut self.writer, &msg).await?;
        match self.receive_response().await? {
            err @ ServerMessage::Error { .. } => Err(response_error(err)),
            response => Ok(response),
        }
    }

    /// Next pushed notification, or `None` when the server closes the stream
    pub async fn next_notification(&mut self) -> Result<Option<Notification>> {
        if let Some(n) = self.pending.pop_front() {
            return Ok(Some(n));
        }
        loop {
            match read_message::<_, ServerMessage>(&mut self.reader).await? {
                Some(ServerMessage::Event(envelope)) => {
                    return Ok(Some(Notification::Event(envelope)))
                }
                Some(ServerMessage::Resync { missed }) => {
                    return Ok(Some(Notification::Resync { missed }))
                }
                Some(other) => {
                    tracing::debug!("Ignoring unsolicited message: {:?}", other);
                }
                None => return Ok(None),
            }
        }
    }

    /// Tell the server we are leaving and close the connection
    pub async fn detach(mut self) -> Result<()> {
        write_frame(&mut self.writer, &ClientMessage::Detach).await?;
        // Drain until the server acknowledges or hangs up
        while let Some(msg) = read_message::<_, ServerMessage>(&mut self.reader).await? {
            if matches!(msg, ServerMessage::Ack { .. }) {
                break;
            }
        }
        Ok(())
    }

    async fn receive_response(&mut self) -> Result<ServerMessage> {
        loop {
            match read_message::<_, ServerMessage>(&mut self.reader).await? {
                Some(ServerMessage::Event(envelope)) => {
                    self.pending.push_back(Notification::Event(envelope))
                }
                Some(ServerMessage::Resync { missed }) => {
                    self.pending.push_back(Notification::Resync { missed })
                }
                Some(response) => return Ok(response),
                None => bail!("Server closed the connection"),
            }
        }
    }
}

fn response_error(msg: ServerMessage) -> anyhow::Error {
    match msg {
        ServerMessage::Error { kind, message } => ServerError { kind, message }.into(),
        other => anyhow!("Unexpected response: {:?}", other),
    }
}

/// Connect to the named server, spawning `interview-server` if none is running
pub async fn connect_or_spawn(
    config: &Config,
    name: &str,
    identity: &dyn IdentityProvider,
    display_name: Option<String>,
) -> Result<Client> {
    let identity = identity
        .current_identity()
        .ok_or_else(|| anyhow!("Not signed in; pass --as or set general.identity"))?;
    let socket_path = config.socket_path(name);

    // Ensure runtime dir exists
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stream = match UnixStream::connect(&socket_path).await {
        Ok(s) => s,
        Err(_) => {
            eprintln!("interview: starting server '{}'...", name);
            let exe = std::env::current_exe()?
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("interview-server");

            let server_bin = if exe.exists() {
                exe.to_string_lossy().to_string()
            } else {
                "interview-server".to_string()
            };

            Command::new(server_bin)
                .arg("--name")
                .arg(name)
                .arg("--socket")
                .arg(&socket_path)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .context("Failed to spawn interview-server")?;

            // Wait for socket to appear
            let mut attempts = 0;
            loop {
                sleep(Duration::from_millis(100)).await;
                if let Ok(s) = UnixStream::connect(&socket_path).await {
                    break s;
                }
                attempts += 1;
                if attempts > 20 {
                    return Err(anyhow!("Timed out waiting for server to start"));
                }
            }
        }
    };

    Client::handshake(stream, identity, display_name).await
}
