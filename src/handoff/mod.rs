//! Handoff protocol between the router and worker agents.
//!
//! # Data Flow
//! ```text
//! Router ──── Handoff::Connection (first bytes + socket handle) ───▶ Worker Agent
//! Router ──── Handoff::Chunk      (later bytes, data only)      ───▶ Worker Agent
//! Router ◀─── ControlMessage      (session / plain-HTTP events) ──── Worker Agent
//! ```
//!
//! # Design Decisions
//! - The socket handle travels at most once per connection, inside the first
//!   message; Rust ownership makes double delivery unrepresentable.
//! - Later chunks are keyed by a durable correlation id instead.
//! - Per-worker mpsc channels preserve per-connection chunk order; no
//!   reordering compensation exists anywhere else.

use std::fmt;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::net::connection::ConnectionId;

/// Identity of a worker agent, assigned by the router at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Durable identifier routing later chunks of a split request to the same
/// worker-held connection. Distinct from the session id: it names one
/// logical request, not one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The transferable part of a live connection.
#[derive(Debug)]
pub enum ConnectionHandle {
    /// Full ownership. Used for upgrades: the router never touches the
    /// stream again.
    Stream(TcpStream),
    /// Write side only. Used for plain HTTP: the router keeps the read half
    /// so it can keep forwarding chunks of the request body.
    WriteHalf(OwnedWriteHalf),
}

/// Messages from the router to one worker agent.
#[derive(Debug)]
pub enum Handoff {
    /// First (and only) handle-bearing message for a connection, carrying
    /// the bytes the router already consumed. `handle` is `None` when the
    /// client closed during the transfer; the agent drops such messages
    /// silently.
    Connection {
        id: ConnectionId,
        correlation_id: Option<CorrelationId>,
        data: Vec<u8>,
        handle: Option<ConnectionHandle>,
    },
    /// A later chunk of a request whose connection was already handed off.
    Chunk {
        correlation_id: CorrelationId,
        data: Vec<u8>,
    },
}

/// Lifecycle events a worker agent reports back to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A session opened on the worker; creates the affinity entry.
    SessionOpen(String),
    /// A session closed; removes the affinity entry.
    SessionClose(String),
    /// A plain (non-session) HTTP connection was accepted.
    HttpOpen,
    /// A plain HTTP connection finished.
    HttpClose,
}

/// One lifecycle event attributed to its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub worker: WorkerId,
    pub event: LifecycleEvent,
}
