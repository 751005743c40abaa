//! Round-robin balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::balancer::Balancer;
use crate::registry::WorkerRecord;

/// Round-robin selector.
///
/// The cursor advances by one per pick and persists across calls and worker
/// churn. With a fresh cursor the first pick lands on the second worker.
/// When the worker set shrinks the cursor may transiently point past the new
/// end; it wraps on the next pick.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobin {
    fn pick(&self, workers: &[Arc<WorkerRecord>]) -> Option<Arc<WorkerRecord>> {
        if workers.is_empty() {
            return None;
        }

        // Selections are serialized by the registry lock, so a plain
        // load/store pair is sufficient here.
        let mut next = self.cursor.load(Ordering::Relaxed) + 1;
        if next >= workers.len() {
            next = 0;
        }
        self.cursor.store(next, Ordering::Relaxed);

        Some(workers[next].clone())
    }
}
