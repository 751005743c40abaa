//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

use crate::balancer::BalancingPolicy;

/// Root configuration for the sticky router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Policy applied when a connection carries no session affinity.
    pub balancing: BalancingPolicy,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g. "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum concurrent router-side connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_connections: 10_000,
        }
    }
}
