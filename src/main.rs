//! sticky-router binary.
//!
//! Starts the router with a pool of in-process demo workers, each wired to a
//! minimal responder standing in for the real application server. Real
//! deployments replace the demo responder with their application server and
//! drive `Router`/`WorkerAgent` from their own supervisor.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sticky_router::balancer::BalancingPolicy;
use sticky_router::config::{load_config, RouterConfig};
use sticky_router::handoff::WorkerId;
use sticky_router::net::Listener;
use sticky_router::sniff;
use sticky_router::worker::{InjectedConnection, WorkerAgent};
use sticky_router::Router;

#[derive(Parser, Debug)]
#[command(name = "sticky-router", about = "Sticky-session connection router")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured load-balancing policy.
    #[arg(long)]
    balancing: Option<BalancingPolicy>,

    /// Number of in-process demo workers to spawn.
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sticky_router=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(policy) = args.balancing {
        config.balancing = policy;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        balancing = %config.balancing,
        workers = args.workers,
        "Configuration loaded"
    );

    let router = Router::new(config.clone());
    for _ in 0..args.workers {
        spawn_demo_worker(&router);
    }

    let listener = Listener::bind(&config.listener).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Interrupt received");
        let _ = shutdown_tx.send(());
    });

    router.run(listener, shutdown_rx).await;
    Ok(())
}

/// Spawn one in-process worker wired to the demo responder.
fn spawn_demo_worker(router: &Router) {
    let (id, handoff_rx) = router.register_worker();
    let (inject_tx, mut inject_rx) = mpsc::channel(64);
    // the demo responder never opens sessions, so the signal source stays idle
    let (_session_tx, session_rx) = mpsc::unbounded_channel();

    let agent = WorkerAgent::new(id, handoff_rx, router.control_sender(), inject_tx, session_rx);
    tokio::spawn(agent.run());
    tokio::spawn(async move {
        while let Some(conn) = inject_rx.recv().await {
            tokio::spawn(answer(id, conn));
        }
    });
}

/// Minimal stand-in for the application server: reads up to the header
/// block, names the serving worker, closes.
async fn answer(worker: WorkerId, mut conn: InjectedConnection) {
    let mut buf = vec![0u8; 8192];
    let mut read = 0usize;
    while read < buf.len() {
        match conn.io.read(&mut buf[read..]).await {
            Ok(0) => break,
            Ok(n) => {
                read += n;
                if sniff::header_block_len(&buf[..read]).is_some() {
                    break;
                }
            }
            Err(_) => return,
        }
    }

    let body = format!("served by {worker}\n");
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = conn.io.write_all(response.as_bytes()).await;
    let _ = conn.io.shutdown().await;
}
