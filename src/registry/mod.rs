//! Affinity and load registry.
//!
//! # Responsibilities
//! - Track live worker records in registration order
//! - Map session ids to the worker that owns them
//! - Apply lifecycle control messages to affinity and connection counts
//! - Purge a dead worker's affinity entries so future sniffs fall through to
//!   normal balancing
//!
//! # Design Decisions
//! - Counts change only through lifecycle messages, never inferred from
//!   traffic, and are maintained under every policy (only least-connection
//!   reads them)
//! - Affinity updates are last-write-wins per session id
//! - One registry per router instance; routers under test never share state

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::balancer::{Balancer, BalancingPolicy};
use crate::error::RouteError;
use crate::handoff::{ControlMessage, Handoff, LifecycleEvent, WorkerId};

/// Bookkeeping entry for one live worker.
#[derive(Debug)]
pub struct WorkerRecord {
    id: WorkerId,
    sender: mpsc::Sender<Handoff>,
    /// Active connections attributed to this worker: open sessions plus
    /// open plain-HTTP connections. Never goes negative.
    active: AtomicUsize,
}

impl WorkerRecord {
    fn new(id: WorkerId, sender: mpsc::Sender<Handoff>) -> Self {
        Self {
            id,
            sender,
            active: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Handoff channel to this worker's agent.
    pub fn sender(&self) -> &mpsc::Sender<Handoff> {
        &self.sender
    }

    /// Current active-connection count.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn inc_connections(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn dec_connections(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    #[cfg(test)]
    pub fn for_test(raw_id: u64, sender: mpsc::Sender<Handoff>) -> Self {
        Self::new(WorkerId::new(raw_id), sender)
    }

    #[cfg(test)]
    pub fn inc_for_test(&self) {
        self.inc_connections();
    }
}

/// Session affinity plus worker records for one router.
///
/// Shared behind a mutex between the accept path (selection) and the control
/// loop (lifecycle application); neither holds the lock across awaits.
#[derive(Debug)]
pub struct Registry {
    workers: Vec<Arc<WorkerRecord>>,
    affinity: HashMap<String, WorkerId>,
    balancer: Box<dyn Balancer>,
    next_worker_id: u64,
}

impl Registry {
    pub fn new(policy: BalancingPolicy) -> Self {
        Self {
            workers: Vec::new(),
            affinity: HashMap::new(),
            balancer: policy.build(),
            next_worker_id: 1,
        }
    }

    /// Register a live worker. Registration order is the enumeration order
    /// the policies see.
    pub fn add_worker(&mut self, sender: mpsc::Sender<Handoff>) -> Arc<WorkerRecord> {
        let id = WorkerId::new(self.next_worker_id);
        self.next_worker_id += 1;
        let record = Arc::new(WorkerRecord::new(id, sender));
        self.workers.push(Arc::clone(&record));
        record
    }

    /// Remove an exited worker and purge every affinity entry pointing at
    /// it, so orphaned session ids fall back to normal balancing.
    pub fn remove_worker(&mut self, id: WorkerId) {
        self.workers.retain(|w| w.id() != id);
        self.affinity.retain(|_, owner| *owner != id);
    }

    /// Pick the worker for a new connection: sticky override when the
    /// session's worker is still live, otherwise the configured policy.
    pub fn select(&self, session_id: Option<&str>) -> Result<Arc<WorkerRecord>, RouteError> {
        if let Some(sid) = session_id {
            if let Some(owner) = self.affinity.get(sid) {
                if let Some(record) = self.worker(*owner) {
                    return Ok(record);
                }
            }
        }
        self.balancer
            .pick(&self.workers)
            .ok_or(RouteError::NoWorkerAvailable)
    }

    pub fn worker(&self, id: WorkerId) -> Option<Arc<WorkerRecord>> {
        self.workers.iter().find(|w| w.id() == id).cloned()
    }

    /// Apply one lifecycle message from a worker agent.
    pub fn apply(&mut self, msg: ControlMessage) {
        let Some(record) = self.worker(msg.worker) else {
            tracing::debug!(worker_id = %msg.worker, "Lifecycle message from unknown worker");
            return;
        };
        match msg.event {
            LifecycleEvent::SessionOpen(sid) => {
                // last-write-wins on re-creation
                self.affinity.insert(sid, msg.worker);
                record.inc_connections();
            }
            LifecycleEvent::SessionClose(sid) => {
                self.affinity.remove(&sid);
                record.dec_connections();
            }
            LifecycleEvent::HttpOpen => record.inc_connections(),
            LifecycleEvent::HttpClose => record.dec_connections(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn session_count(&self) -> usize {
        self.affinity.len()
    }

    /// Snapshot of per-worker loads, in registration order.
    pub fn loads(&self) -> Vec<(WorkerId, usize)> {
        self.workers
            .iter()
            .map(|w| (w.id(), w.active_connections()))
            .collect()
    }
}
