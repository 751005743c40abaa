//! Error taxonomy for the routing core.
//!
//! # Design Decisions
//! - Every fault is handled at the point of detection; none escalate to a
//!   process-level failure.
//! - The only client-visible failure is `NoWorkerAvailable`, answered with a
//!   minimal 503 before the connection is closed.
//! - Orphaned sockets and unknown correlation ids are expected races, not
//!   errors; they are logged and dropped where they occur.

use thiserror::Error;

use crate::handoff::WorkerId;

/// Errors surfaced by worker selection and connection handoff.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The live worker set is empty. The client receives a minimal
    /// service-unavailable reply and the connection is closed.
    #[error("no worker available")]
    NoWorkerAvailable,

    /// Sending a handoff message to the chosen worker failed because the
    /// worker died concurrently. The connection is destroyed; the client
    /// must reconnect. There is no failover to another worker, since part
    /// of the stream may already have been delivered.
    #[error("handoff to {worker} failed")]
    HandoffSendFailure {
        /// The worker the handoff was addressed to.
        worker: WorkerId,
    },
}
