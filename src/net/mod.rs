//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (identity for tracing)
//!     → Hand off to the router's sniffing state machine
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion on the router side
//! - The router only observes bytes; no protocol is spoken at this boundary

pub mod connection;
pub mod listener;

pub use connection::ConnectionId;
pub use listener::{ConnectionPermit, Listener, ListenerError};
