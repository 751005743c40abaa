//! Connection routing and handoff.
//!
//! # Data Flow
//! ```text
//! Inbound byte stream
//!     → first read (sniff: session id / upgrade / multi-chunk)
//!     → registry (sticky override, else balancing policy)
//!     → Handoff::Connection (+ socket handle) → worker agent
//!     → [multi-chunk only] read loop → Handoff::Chunk* → same worker
//!
//! Worker agents → ControlMessage → control loop → registry
//! ```
//!
//! # Design Decisions
//! - One task per connection; a slow or silent client delays only its own
//!   handoff decision
//! - Registry mutations funnel through a single control loop; the accept
//!   path takes the lock only for the selection itself
//! - A failed handoff send destroys the connection: part of the stream may
//!   already be at the dead worker, so retrying elsewhere could double
//!   deliver

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::handoff::{ConnectionHandle, ControlMessage, CorrelationId, Handoff, WorkerId};
use crate::net::connection::ConnectionId;
use crate::net::listener::{ConnectionPermit, Listener};
use crate::registry::Registry;
use crate::sniff;

/// Read buffer size on the router side.
const READ_BUF: usize = 64 * 1024;

/// Handoff channel depth per worker.
const HANDOFF_QUEUE: usize = 256;

/// Minimal reply when no worker is live. Sent only to connections that have
/// not been assigned yet; a reply mid-stream would be malformed.
const UNAVAILABLE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

/// The controlling endpoint: accepts every inbound connection, sniffs,
/// selects a worker and hands the connection off.
pub struct Router {
    registry: Arc<Mutex<Registry>>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
}

impl Router {
    /// Create a router and start its control loop.
    pub fn new(config: RouterConfig) -> Self {
        let registry = Arc::new(Mutex::new(Registry::new(config.balancing)));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(control_loop(Arc::clone(&registry), control_rx));
        Self {
            registry,
            control_tx,
        }
    }

    /// Register a live worker. The returned receiver is the agent's handoff
    /// feed; dropping it makes subsequent handoffs fail (worker death).
    pub fn register_worker(&self) -> (WorkerId, mpsc::Receiver<Handoff>) {
        let (tx, rx) = mpsc::channel(HANDOFF_QUEUE);
        let record = self.registry().add_worker(tx);
        tracing::info!(worker_id = %record.id(), "Worker registered");
        (record.id(), rx)
    }

    /// Remove an exited worker and purge its affinity entries.
    pub fn remove_worker(&self, id: WorkerId) {
        self.registry().remove_worker(id);
        tracing::info!(worker_id = %id, "Worker removed");
    }

    /// Control-message sender to hand to worker agents.
    pub fn control_sender(&self) -> mpsc::UnboundedSender<ControlMessage> {
        self.control_tx.clone()
    }

    /// Snapshot of per-worker active-connection counts.
    pub fn worker_loads(&self) -> Vec<(WorkerId, usize)> {
        self.registry().loads()
    }

    /// Accept loop. Runs until the shutdown signal fires.
    pub async fn run(&self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(handle_connection(stream, peer, registry, permit));
                    }
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Router shutting down");
                    break;
                }
            }
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().expect("registry lock poisoned")
    }
}

/// Applies lifecycle messages from worker agents to the registry, one at a
/// time: the single writer for affinity and counts.
async fn control_loop(
    registry: Arc<Mutex<Registry>>,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
) {
    while let Some(msg) = control_rx.recv().await {
        tracing::trace!(worker_id = %msg.worker, event = ?msg.event, "Lifecycle event");
        registry.lock().expect("registry lock poisoned").apply(msg);
    }
}

/// Per-connection state machine: sniff → select → hand off → (multi-chunk
/// only) forward the rest of the body.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Mutex<Registry>>,
    permit: ConnectionPermit,
) {
    let _permit = permit;
    let id = ConnectionId::new();

    let mut buf = vec![0u8; READ_BUF];
    let n = match stream.read(&mut buf).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            tracing::trace!(connection_id = %id, error = %e, "First read failed");
            return;
        }
    };
    buf.truncate(n);

    let sniffed = sniff::sniff(&buf);
    tracing::debug!(
        connection_id = %id,
        peer_addr = %peer,
        session_id = sniffed.session_id.as_deref().unwrap_or("-"),
        upgrade = sniffed.upgrade,
        multi_chunk = sniffed.multi_chunk,
        "First chunk sniffed"
    );

    let selected = {
        let registry = registry.lock().expect("registry lock poisoned");
        registry.select(sniffed.session_id.as_deref())
    };
    let worker = match selected {
        Ok(worker) => worker,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "Replying 503");
            let _ = stream.write_all(UNAVAILABLE).await;
            let _ = stream.shutdown().await;
            return;
        }
    };
    tracing::debug!(connection_id = %id, worker_id = %worker.id(), "Worker selected");

    if sniffed.upgrade {
        // full ownership transfers; the router never reads this stream again
        let msg = Handoff::Connection {
            id,
            correlation_id: None,
            data: buf,
            handle: Some(ConnectionHandle::Stream(stream)),
        };
        if worker.sender().send(msg).await.is_err() {
            // the stream comes back inside the error and is destroyed here
            let e = RouteError::HandoffSendFailure { worker: worker.id() };
            tracing::debug!(connection_id = %id, error = %e, "Connection destroyed");
        }
        return;
    }

    let correlation_id = sniffed.multi_chunk.then(CorrelationId::new);
    let (mut read_half, write_half) = stream.into_split();
    let msg = Handoff::Connection {
        id,
        correlation_id,
        data: buf,
        handle: Some(ConnectionHandle::WriteHalf(write_half)),
    };
    if worker.sender().send(msg).await.is_err() {
        let e = RouteError::HandoffSendFailure { worker: worker.id() };
        tracing::debug!(connection_id = %id, error = %e, "Connection destroyed");
        return;
    }

    let Some(correlation_id) = correlation_id else {
        return;
    };

    // keep reading locally so later chunks of this request reach the same
    // worker-held connection
    let mut chunk = vec![0u8; READ_BUF];
    loop {
        let n = match read_half.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::trace!(connection_id = %id, error = %e, "Chunk read failed");
                break;
            }
        };
        let msg = Handoff::Chunk {
            correlation_id,
            data: chunk[..n].to_vec(),
        };
        if worker.sender().send(msg).await.is_err() {
            let e = RouteError::HandoffSendFailure { worker: worker.id() };
            tracing::debug!(connection_id = %id, error = %e, "Worker gone mid-body");
            break;
        }
    }
}
