//! interview-room - session core for live technical interviews
//!
//! This crate provides the core functionality for interview-room, including:
//! - Session phase derivation, roles and admission
//! - A shared code workspace with optimistic revisions
//! - Ordered chat with replay for late joiners
//! - Host-only termination that never loses a completed interview
//! - Client-server protocol and configuration management
//!
//! # Architecture
//!
//! interview-room uses a client-server model where:
//! - The server (`interview-server`) hosts every live session through a
//!   [`orchestrator::SessionOrchestrator`]
//! - The client (`interview`) schedules, joins and drives sessions
//! - Communication happens over Unix domain sockets
//!
//! The identity provider, interview store and call transport are traits in
//! [`external`]; in-process implementations back the daemon and the tests.

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod external;
pub mod orchestrator;
pub mod protocol;
pub mod roster;
pub mod server;
pub mod session;
pub mod termination;
pub mod workspace;

pub use error::{ErrorKind, Result, SessionError};
pub use orchestrator::{JoinSnapshot, JoinTicket, OrchestratorConfig, SessionOrchestrator};
