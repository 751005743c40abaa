//! Reassembly tunnel for plain-HTTP connections.
//!
//! # Data Flow
//! ```text
//! Handoff chunks ──▶ Tunnel::push (boundary check) ──▶ duplex ──▶ application
//! application output ──▶ duplex ──▶ relay task ──▶ client write half
//! ```
//!
//! # Design Decisions
//! - Body bytes past the declared length are trimmed at push time, so a
//!   malformed or over-long body never reaches the application server
//! - One relay task per tunnel; the agent loop never blocks on a slow
//!   application connection
//! - `HttpClose` fires when the relay ends, whether the application finished
//!   the response or the client went away

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

use crate::handoff::{ControlMessage, CorrelationId, LifecycleEvent, WorkerId};

/// Capacity of the in-memory pipe between the tunnel and the injected
/// connection object.
pub(crate) const PIPE_CAPACITY: usize = 64 * 1024;

/// Worker-side reassembly state for one handed-off plain-HTTP connection.
#[derive(Debug)]
pub struct Tunnel {
    correlation_id: Option<CorrelationId>,
    /// Declared body length; 0 when no length header was present,
    /// `usize::MAX` for transfer-encoded bodies without a length.
    expected: usize,
    /// Body bytes forwarded so far.
    received: usize,
    chunk_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Tunnel {
    /// Forward one continuation chunk into the injected connection's read
    /// path, trimming at the declared body boundary.
    pub fn push(&mut self, mut data: Vec<u8>) {
        if self.received >= self.expected {
            tracing::trace!(
                correlation_id = ?self.correlation_id,
                len = data.len(),
                "Chunk past declared body length dropped"
            );
            return;
        }
        let room = self.expected - self.received;
        if data.len() > room {
            data.truncate(room);
        }
        self.received += data.len();
        // receiver gone means the connection already closed; nothing to do
        let _ = self.chunk_tx.send(data);
    }

    #[cfg(test)]
    fn for_test(expected: usize, received: usize) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        (
            Self {
                correlation_id: None,
                expected,
                received,
                chunk_tx,
            },
            chunk_rx,
        )
    }
}

/// Everything a tunnel needs besides the reassembly state itself.
pub(crate) struct TunnelParams {
    pub worker: WorkerId,
    pub correlation_id: Option<CorrelationId>,
    /// Declared body length.
    pub expected: usize,
    /// Body bytes already contained in the first chunk.
    pub received: usize,
    /// The complete first chunk (headers plus any leading body bytes).
    pub first_chunk: Vec<u8>,
    pub write_half: OwnedWriteHalf,
    /// Agent-side end of the duplex pair; the application server holds the
    /// other end.
    pub pipe: DuplexStream,
    pub control_tx: mpsc::UnboundedSender<ControlMessage>,
    /// Tells the agent to drop its correlation-id mapping.
    pub done_tx: mpsc::UnboundedSender<CorrelationId>,
}

/// Start the per-connection relay and return the reassembly handle.
pub(crate) fn spawn(params: TunnelParams) -> Tunnel {
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let tunnel = Tunnel {
        correlation_id: params.correlation_id,
        expected: params.expected,
        received: params.received,
        chunk_tx,
    };
    tokio::spawn(run(params, chunk_rx));
    tunnel
}

async fn run(params: TunnelParams, mut chunk_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let TunnelParams {
        worker,
        correlation_id,
        first_chunk,
        write_half: mut client,
        pipe,
        control_tx,
        done_tx,
        ..
    } = params;

    let (mut app_read, mut app_write) = tokio::io::split(pipe);

    // request direction: first chunk, then whatever the agent pushes
    let feed = tokio::spawn(async move {
        if app_write.write_all(&first_chunk).await.is_err() {
            return;
        }
        while let Some(chunk) = chunk_rx.recv().await {
            if app_write.write_all(&chunk).await.is_err() {
                break;
            }
        }
        // dropping app_write signals end-of-request to the application
    });

    // response direction: runs until the application closes its end or the
    // client goes away
    if let Err(e) = tokio::io::copy(&mut app_read, &mut client).await {
        tracing::trace!(worker_id = %worker, error = %e, "Client went away mid-response");
    }
    let _ = client.shutdown().await;
    feed.abort();

    if let Some(id) = correlation_id {
        let _ = done_tx.send(id);
    }
    let _ = control_tx.send(ControlMessage {
        worker,
        event: LifecycleEvent::HttpClose,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn forwards_until_declared_length() {
        let (mut tunnel, mut rx) = Tunnel::for_test(11, 6);
        tunnel.push(b"world".to_vec());
        assert_eq!(drain(&mut rx), b"world");
    }

    #[test]
    fn trims_chunk_crossing_the_boundary() {
        let (mut tunnel, mut rx) = Tunnel::for_test(10, 6);
        tunnel.push(b"worldJUNK".to_vec());
        assert_eq!(drain(&mut rx), b"worl");

        // boundary reached; everything after is suppressed
        tunnel.push(b"more".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_declared_body_drops_all_chunks() {
        let (mut tunnel, mut rx) = Tunnel::for_test(0, 0);
        tunnel.push(b"unexpected".to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unbounded_body_keeps_forwarding() {
        let (mut tunnel, mut rx) = Tunnel::for_test(usize::MAX, 0);
        tunnel.push(b"a".to_vec());
        tunnel.push(b"b".to_vec());
        assert_eq!(drain(&mut rx), b"ab");
    }
}
