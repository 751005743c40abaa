//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! First chunk sniffed → no session affinity found
//!     → Apply the configured policy:
//!         - random.rs (uniform choice)
//!         - round_robin.rs (stored cursor, advances one per pick)
//!         - least_conn.rs (fewest active connections, default)
//!     → Return a worker record or None (no live worker)
//! ```
//!
//! # Design Decisions
//! - Policies never mutate connection counts; counts belong to the registry
//!   and change only through lifecycle control messages
//! - A sticky affinity hit bypasses the policy entirely and does not advance
//!   the round-robin cursor
//! - Selections are serialized by the registry lock

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::WorkerRecord;

pub mod least_conn;
pub mod random;
pub mod round_robin;

/// Selection strategy for connections with no session affinity.
pub trait Balancer: Send + Sync + std::fmt::Debug {
    /// Pick a worker from the live set, in registration order.
    /// Returns `None` when the set is empty.
    fn pick(&self, workers: &[Arc<WorkerRecord>]) -> Option<Arc<WorkerRecord>>;
}

/// Configured balancing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancingPolicy {
    Random,
    RoundRobin,
    #[default]
    LeastConnection,
}

impl BalancingPolicy {
    /// Instantiate the policy. Each router owns its own instance, so cursor
    /// state is never shared across routers.
    pub fn build(self) -> Box<dyn Balancer> {
        match self {
            BalancingPolicy::Random => Box::new(random::Random::new()),
            BalancingPolicy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            BalancingPolicy::LeastConnection => Box::new(least_conn::LeastConnection::new()),
        }
    }
}

impl std::str::FromStr for BalancingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(BalancingPolicy::Random),
            "round-robin" => Ok(BalancingPolicy::RoundRobin),
            "least-connection" => Ok(BalancingPolicy::LeastConnection),
            other => Err(format!(
                "unknown balancing policy '{other}' (expected random, round-robin or least-connection)"
            )),
        }
    }
}

impl std::fmt::Display for BalancingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BalancingPolicy::Random => "random",
            BalancingPolicy::RoundRobin => "round-robin",
            BalancingPolicy::LeastConnection => "least-connection",
        };
        f.write_str(name)
    }
}
