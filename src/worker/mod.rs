//! Worker-side handoff handling.
//!
//! # Data Flow
//! ```text
//! Handoff::Connection (upgrade)
//!     → replay.rs (buffered first chunk ahead of the live stream)
//!     → injected into the application server
//!
//! Handoff::Connection (plain HTTP) + Handoff::Chunk*
//!     → tunnel.rs (reassembly, boundary enforcement)
//!     → injected duplex end → application server
//!     → application output relayed back to the client's write half
//!
//! Application server session signals
//!     → agent.rs → ControlMessage → router registry
//! ```
//!
//! # Design Decisions
//! - The application server is a collaborator behind two channels: it
//!   consumes injected connections and emits session open/close signals
//! - Each injected connection observes the identical byte sequence a local
//!   accept would have produced

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::net::connection::ConnectionId;

pub mod agent;
pub mod replay;
pub mod tunnel;

pub use agent::WorkerAgent;
pub use replay::ReplayStream;

/// Byte stream handed to the application server: a replayed live socket for
/// upgrades, or the application side of a reassembly tunnel for plain HTTP.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// A connection presented to the application server as if freshly accepted.
pub struct InjectedConnection {
    pub id: ConnectionId,
    pub io: Box<dyn Io>,
}

impl fmt::Debug for InjectedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Session lifecycle signals the application server emits for connections
/// that carry a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Open(String),
    Close(String),
}
