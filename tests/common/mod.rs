//! Shared helpers for integration tests: an in-process cluster with mock
//! application servers behind each worker agent.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use sticky_router::balancer::BalancingPolicy;
use sticky_router::config::RouterConfig;
use sticky_router::handoff::WorkerId;
use sticky_router::net::Listener;
use sticky_router::sniff;
use sticky_router::worker::{InjectedConnection, SessionEvent, WorkerAgent};
use sticky_router::Router;

/// One request captured by a mock application server.
#[derive(Debug, Clone)]
pub struct Captured {
    pub worker: WorkerId,
    pub bytes: Vec<u8>,
}

pub type Capture = Arc<Mutex<Vec<Captured>>>;

pub struct TestCluster {
    pub router: Arc<Router>,
    pub addr: SocketAddr,
    pub workers: Vec<WorkerId>,
    pub capture: Capture,
    _shutdown: broadcast::Sender<()>,
}

/// Start a router on an ephemeral port with `workers` mock workers.
pub async fn start_cluster(policy: BalancingPolicy, workers: usize) -> TestCluster {
    let mut config = RouterConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.balancing = policy;

    let router = Arc::new(Router::new(config.clone()));
    let capture: Capture = Arc::new(Mutex::new(Vec::new()));
    let workers = (0..workers)
        .map(|_| spawn_worker(&router, Arc::clone(&capture)))
        .collect();

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let accept = Arc::clone(&router);
    tokio::spawn(async move { accept.run(listener, shutdown_rx).await });

    TestCluster {
        router,
        addr,
        workers,
        capture,
        _shutdown: shutdown_tx,
    }
}

/// Spawn a worker agent wired to a mock application server.
///
/// The mock answers plain HTTP with a 200 naming its worker, answers
/// upgrades with a 101 and emits session open/close signals for any `sid=`
/// token it sees, mirroring the application-server collaborator contract.
pub fn spawn_worker(router: &Router, capture: Capture) -> WorkerId {
    let (id, handoff_rx) = router.register_worker();
    let (inject_tx, mut inject_rx) = mpsc::channel(64);
    let (session_tx, session_rx) = mpsc::unbounded_channel();

    let agent = WorkerAgent::new(id, handoff_rx, router.control_sender(), inject_tx, session_rx);
    tokio::spawn(agent.run());
    tokio::spawn(async move {
        while let Some(conn) = inject_rx.recv().await {
            tokio::spawn(serve(id, conn, Arc::clone(&capture), session_tx.clone()));
        }
    });
    id
}

async fn serve(
    worker: WorkerId,
    mut conn: InjectedConnection,
    capture: Capture,
    session_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    // headers first, then any declared body
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let header_end = loop {
        match conn.io.read(&mut tmp).await {
            Ok(0) => return,
            Ok(n) => {
                buf.extend_from_slice(&tmp[..n]);
                if let Some(end) = sniff::header_block_len(&buf) {
                    break end;
                }
            }
            Err(_) => return,
        }
    };
    let expected = sniff::content_length(&buf).unwrap_or(0);
    while buf.len() - header_end < expected {
        match conn.io.read(&mut tmp).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
            Err(_) => break,
        }
    }

    let sniffed = sniff::sniff(&buf);
    capture.lock().unwrap().push(Captured {
        worker,
        bytes: buf.clone(),
    });

    if sniffed.upgrade {
        if let Some(sid) = sniffed.session_id.clone() {
            let _ = session_tx.send(SessionEvent::Open(sid));
        }
        let _ = conn
            .io
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\nupgrade: websocket\r\nconnection: upgrade\r\n\r\n",
            )
            .await;
        // hold the session until the client goes away
        loop {
            match conn.io.read(&mut tmp).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        if let Some(sid) = sniffed.session_id {
            let _ = session_tx.send(SessionEvent::Close(sid));
        }
    } else {
        let body = format!("worker={}", worker.as_u64());
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = conn.io.write_all(response.as_bytes()).await;
        let _ = conn.io.shutdown().await;
    }
}

/// Send one raw request and read the whole response (the mock closes the
/// connection after answering).
#[allow(dead_code)]
pub async fn http_request(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out).await;
    String::from_utf8_lossy(&out).into_owned()
}

#[allow(dead_code)]
pub fn get_request(sid: Option<&str>) -> Vec<u8> {
    let query = sid.map(|s| format!("?sid={s}")).unwrap_or_default();
    format!("GET /{query} HTTP/1.1\r\nhost: test\r\n\r\n").into_bytes()
}

/// Open a WebSocket-upgraded session and keep it alive; returns the stream
/// after the 101 handshake completed.
#[allow(dead_code)]
pub async fn open_session(addr: SocketAddr, sid: &str) -> TcpStream {
    let request = format!(
        "GET /socket.io/?EIO=4&transport=websocket&sid={sid} HTTP/1.1\r\nhost: test\r\nconnection: upgrade\r\nupgrade: websocket\r\n\r\n"
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed before 101 handshake");
        buf.extend_from_slice(&tmp[..n]);
        if sniff::header_block_len(&buf).is_some() {
            break;
        }
    }
    assert!(buf.starts_with(b"HTTP/1.1 101"));
    stream
}

/// Worker number out of a mock 200 response.
#[allow(dead_code)]
pub fn served_by(response: &str) -> u64 {
    let at = response
        .find("worker=")
        .unwrap_or_else(|| panic!("no worker marker in response: {response:?}"));
    response[at + "worker=".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap()
}

/// Settle time for control messages to reach the registry.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}
