//! End-to-end routing behavior over real TCP: policy cycling, sticky
//! override, load accounting, worker exit and the no-worker reply.

mod common;

use common::{get_request, http_request, open_session, served_by, settle, start_cluster};
use sticky_router::balancer::BalancingPolicy;

const SID_A: &str = "AbCdEf0123456789AbCd";
const SID_B: &str = "ZyXwVu9876543210ZyXw";

#[tokio::test]
async fn round_robin_cycles_through_workers() {
    let cluster = start_cluster(BalancingPolicy::RoundRobin, 3).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let response = http_request(cluster.addr, &get_request(None)).await;
        seen.push(served_by(&response));
    }

    // fresh cursor: second worker first, then around the ring
    let ids: Vec<u64> = cluster.workers.iter().map(|w| w.as_u64()).collect();
    assert_eq!(seen, vec![ids[1], ids[2], ids[0]]);
}

#[tokio::test]
async fn session_affinity_overrides_round_robin() {
    let cluster = start_cluster(BalancingPolicy::RoundRobin, 3).await;

    let _session = open_session(cluster.addr, SID_A).await;
    settle().await;

    let owner = {
        let captured = cluster.capture.lock().unwrap();
        assert_eq!(captured.len(), 1);
        captured[0].worker
    };
    assert_eq!(owner, cluster.workers[1]);

    // the session id pins follow-up requests to the owner, repeatedly
    for _ in 0..3 {
        let response = http_request(cluster.addr, &get_request(Some(SID_A))).await;
        assert_eq!(served_by(&response), owner.as_u64());
    }

    // sticky hits do not advance the rotation
    let response = http_request(cluster.addr, &get_request(None)).await;
    assert_eq!(served_by(&response), cluster.workers[2].as_u64());
}

#[tokio::test]
async fn upgrade_request_is_replayed_byte_for_byte() {
    let cluster = start_cluster(BalancingPolicy::LeastConnection, 1).await;

    let request = format!(
        "GET /socket.io/?EIO=4&transport=websocket&sid={SID_A} HTTP/1.1\r\nhost: test\r\nconnection: upgrade\r\nupgrade: websocket\r\n\r\n"
    );
    let _session = open_session(cluster.addr, SID_A).await;
    settle().await;

    let captured = cluster.capture.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].bytes, request.as_bytes());
}

#[tokio::test]
async fn least_connection_tracks_session_load() {
    let cluster = start_cluster(BalancingPolicy::LeastConnection, 3).await;

    // all idle: the first registered worker wins the tie
    let session = open_session(cluster.addr, SID_A).await;
    settle().await;

    let loads = cluster.router.worker_loads();
    assert_eq!(loads[0], (cluster.workers[0], 1));
    assert_eq!(loads[1].1, 0);

    // a new client without affinity lands on an idle worker
    let response = http_request(cluster.addr, &get_request(None)).await;
    assert_eq!(served_by(&response), cluster.workers[1].as_u64());

    // disconnect releases the load
    drop(session);
    settle().await;
    let loads = cluster.router.worker_loads();
    assert_eq!(loads[0].1, 0);
}

#[tokio::test]
async fn removed_worker_releases_its_sessions() {
    let cluster = start_cluster(BalancingPolicy::RoundRobin, 3).await;

    let _session = open_session(cluster.addr, SID_B).await;
    settle().await;
    assert_eq!(
        cluster.capture.lock().unwrap()[0].worker,
        cluster.workers[1]
    );

    cluster.router.remove_worker(cluster.workers[1]);

    // the orphaned session id falls back to normal balancing
    let response = http_request(cluster.addr, &get_request(Some(SID_B))).await;
    let rerouted = served_by(&response);
    assert_ne!(rerouted, cluster.workers[1].as_u64());
    assert_eq!(rerouted, cluster.workers[0].as_u64());
}

#[tokio::test]
async fn no_live_worker_gets_a_minimal_503() {
    let cluster = start_cluster(BalancingPolicy::LeastConnection, 0).await;

    let response = http_request(cluster.addr, &get_request(None)).await;
    assert!(
        response.starts_with("HTTP/1.1 503"),
        "unexpected response: {response:?}"
    );
}

#[tokio::test]
async fn dead_worker_handoff_destroys_the_connection() {
    let cluster = start_cluster(BalancingPolicy::RoundRobin, 0).await;

    // registered but its agent is gone
    let (_id, handoff_rx) = cluster.router.register_worker();
    drop(handoff_rx);

    let response = http_request(cluster.addr, &get_request(None)).await;
    assert!(response.is_empty(), "unexpected response: {response:?}");
}
