//! Worker agent: the worker-side endpoint of the handoff protocol.
//!
//! # Responsibilities
//! - Receive handed-off connections and inject them into the application
//!   server as if freshly accepted
//! - Route continuation chunks to their reassembly tunnel
//! - Forward the application server's session signals and the plain-HTTP
//!   open/close pairs to the router

use std::collections::HashMap;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::handoff::{
    ConnectionHandle, ControlMessage, CorrelationId, Handoff, LifecycleEvent, WorkerId,
};
use crate::net::connection::ConnectionId;
use crate::sniff;
use crate::worker::replay::ReplayStream;
use crate::worker::tunnel::{self, Tunnel, TunnelParams, PIPE_CAPACITY};
use crate::worker::{InjectedConnection, SessionEvent};

/// One agent runs inside each worker, bridging the router's handoff channel
/// to the local application server.
pub struct WorkerAgent {
    id: WorkerId,
    handoff_rx: mpsc::Receiver<Handoff>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    inject_tx: mpsc::Sender<InjectedConnection>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    tunnels: HashMap<CorrelationId, Tunnel>,
    done_tx: mpsc::UnboundedSender<CorrelationId>,
    done_rx: mpsc::UnboundedReceiver<CorrelationId>,
}

impl WorkerAgent {
    /// Wire an agent to its router-side channels and its local application
    /// server (injection sink plus session-signal source).
    pub fn new(
        id: WorkerId,
        handoff_rx: mpsc::Receiver<Handoff>,
        control_tx: mpsc::UnboundedSender<ControlMessage>,
        inject_tx: mpsc::Sender<InjectedConnection>,
        session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            id,
            handoff_rx,
            control_tx,
            inject_tx,
            session_rx,
            tunnels: HashMap::new(),
            done_tx,
            done_rx,
        }
    }

    /// Drive the agent until the router drops the handoff channel.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.handoff_rx.recv() => match msg {
                    Some(msg) => self.handle_handoff(msg).await,
                    None => break,
                },
                Some(event) = self.session_rx.recv() => self.forward_session(event),
                Some(id) = self.done_rx.recv() => {
                    self.tunnels.remove(&id);
                }
            }
        }
        tracing::debug!(worker_id = %self.id, "Worker agent stopped");
    }

    async fn handle_handoff(&mut self, msg: Handoff) {
        match msg {
            Handoff::Connection {
                id,
                correlation_id,
                data,
                handle,
            } => match handle {
                // client closed during the transfer; an expected race
                None => tracing::debug!(
                    connection_id = %id,
                    "Handoff arrived without a socket; dropped"
                ),
                Some(ConnectionHandle::Stream(stream)) => self.inject_stream(id, data, stream).await,
                Some(ConnectionHandle::WriteHalf(write_half)) => {
                    self.open_tunnel(id, correlation_id, data, write_half).await
                }
            },
            Handoff::Chunk {
                correlation_id,
                data,
            } => match self.tunnels.get_mut(&correlation_id) {
                Some(tunnel) => tunnel.push(data),
                // the owning connection already closed
                None => tracing::trace!(
                    correlation_id = %correlation_id,
                    len = data.len(),
                    "Chunk for unknown correlation id dropped"
                ),
            },
        }
    }

    /// Upgrade path: full ownership arrived; replay the first chunk ahead of
    /// live reads so the application server sees an untouched byte stream.
    async fn inject_stream(&self, id: ConnectionId, data: Vec<u8>, stream: TcpStream) {
        let conn = InjectedConnection {
            id,
            io: Box::new(ReplayStream::new(data, stream)),
        };
        if self.inject_tx.send(conn).await.is_err() {
            tracing::debug!(connection_id = %id, "Application server gone; connection dropped");
        }
    }

    /// Plain-HTTP path: build a reassembly tunnel around the write half and
    /// inject the application side of the pipe.
    async fn open_tunnel(
        &mut self,
        id: ConnectionId,
        correlation_id: Option<CorrelationId>,
        data: Vec<u8>,
        write_half: tokio::net::tcp::OwnedWriteHalf,
    ) {
        let expected = match sniff::content_length(&data) {
            Some(n) => n,
            // transfer-encoding without a length: bounded by connection close
            None if sniff::has_body_headers(&data) => usize::MAX,
            None => 0,
        };
        let header_len = sniff::header_block_len(&data).unwrap_or(data.len());
        let received = data.len() - header_len;

        let (app_io, pipe) = tokio::io::duplex(PIPE_CAPACITY);
        let tunnel = tunnel::spawn(TunnelParams {
            worker: self.id,
            correlation_id,
            expected,
            received,
            first_chunk: data,
            write_half,
            pipe,
            control_tx: self.control_tx.clone(),
            done_tx: self.done_tx.clone(),
        });
        if let Some(correlation_id) = correlation_id {
            self.tunnels.insert(correlation_id, tunnel);
        }

        let _ = self.control_tx.send(ControlMessage {
            worker: self.id,
            event: LifecycleEvent::HttpOpen,
        });

        let conn = InjectedConnection {
            id,
            io: Box::new(app_io),
        };
        if self.inject_tx.send(conn).await.is_err() {
            tracing::debug!(connection_id = %id, "Application server gone; connection dropped");
        }
    }

    fn forward_session(&self, event: SessionEvent) {
        let event = match event {
            SessionEvent::Open(sid) => LifecycleEvent::SessionOpen(sid),
            SessionEvent::Close(sid) => LifecycleEvent::SessionClose(sid),
        };
        // send failures are ignored: a dead router means the process group
        // is going down anyway
        let _ = self.control_tx.send(ControlMessage {
            worker: self.id,
            event,
        });
    }
}
