//! Least-connection balancing strategy (the default).

use std::sync::Arc;

use crate::balancer::Balancer;
use crate::registry::WorkerRecord;

/// Picks the worker with the minimum active-connection count.
/// In case of a tie the first worker in registration order wins.
#[derive(Debug, Default)]
pub struct LeastConnection;

impl LeastConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for LeastConnection {
    fn pick(&self, workers: &[Arc<WorkerRecord>]) -> Option<Arc<WorkerRecord>> {
        workers.iter().min_by_key(|w| w.active_connections()).cloned()
    }
}
