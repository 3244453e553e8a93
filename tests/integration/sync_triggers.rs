// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for what starts a sync: reconnects, the periodic timer,
//! and overlapping callers.
//!
//! Most tests run against [`LoopbackGateway`] on a paused clock so call
//! counts and timing are exact. The last test drives a real TCP probe
//! against a `tasksync-server` that goes away and comes back.

use std::sync::Arc;
use std::time::Duration;

use tasksync::auth::Session;
use tasksync::cache::{InMemoryStore, LocalCache};
use tasksync::connectivity::{ConnectivityMonitor, TcpProbe};
use tasksync::gateway::{GatewayError, GatewayOp, HttpGateway, LoopbackGateway, RemoteGateway};
use tasksync::state::{AppState, SyncStatus};
use tasksync::sync::{SyncConfig, SyncOrchestrator, SyncOutcome};
use tasksync_proto::api::{TaskListDraft, TaskQuery};
use tasksync_server::store::TaskStore;

// =============================================================================
// Helpers
// =============================================================================

const INTERVAL: Duration = Duration::from_secs(60);

struct Harness {
    gateway: Arc<LoopbackGateway>,
    monitor: Arc<ConnectivityMonitor>,
    sync: Arc<SyncOrchestrator<LoopbackGateway, InMemoryStore>>,
}

fn harness(online: bool) -> Harness {
    let gateway = Arc::new(LoopbackGateway::new());
    let monitor = Arc::new(ConnectivityMonitor::manual(online));
    let sync = Arc::new(SyncOrchestrator::new(
        Arc::clone(&gateway),
        LocalCache::new(Arc::new(InMemoryStore::new())),
        Arc::clone(&monitor),
        Arc::new(AppState::new()),
        SyncConfig { interval: INTERVAL },
    ));
    Harness {
        gateway,
        monitor,
        sync,
    }
}

/// Let spawned tasks run without advancing far enough to hit the timer.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn reconnect_with_pending_status_fires_one_sync_all() {
    let h = harness(false);
    h.gateway.seed_list("Work");

    assert_eq!(h.sync.sync_task_lists().await, SyncOutcome::Pending);
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 0);

    let _driver = h.sync.spawn_background();
    settle().await;

    h.monitor.report(true);
    settle().await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);
    assert_eq!(h.gateway.calls(GatewayOp::ListTasks), 1);
    let state = h.sync.state().sync_state();
    assert_eq!(state.status, SyncStatus::Synced);
    assert!(state.online);

    settle().await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);
}

#[tokio::test(start_paused = true)]
async fn going_offline_marks_pending_and_reconnect_resyncs() {
    let h = harness(true);
    h.gateway.seed_list("Work");
    let _driver = h.sync.spawn_background();
    settle().await;

    assert_eq!(h.sync.sync_all().await, SyncOutcome::Synced);
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);

    h.monitor.report(false);
    settle().await;
    let state = h.sync.state().sync_state();
    assert_eq!(state.status, SyncStatus::Pending);
    assert!(!state.online);

    h.monitor.report(true);
    settle().await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 2);
    assert_eq!(h.sync.state().sync_state().status, SyncStatus::Synced);
}

#[tokio::test(start_paused = true)]
async fn offline_after_error_then_reconnect_resyncs() {
    let h = harness(true);
    h.gateway.seed_list("Work");
    h.gateway
        .fail_next(GatewayOp::ListTaskLists, GatewayError::Timeout);
    assert!(matches!(
        h.sync.sync_all().await,
        SyncOutcome::Failed(GatewayError::Timeout)
    ));

    let _driver = h.sync.spawn_background();
    settle().await;

    // Going offline turns `error` into `pending`, so the return trip syncs.
    h.monitor.report(false);
    settle().await;
    h.monitor.report(true);
    settle().await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 2);
    assert_eq!(h.sync.state().sync_state().status, SyncStatus::Synced);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_driver() {
    let h = harness(false);
    h.gateway.seed_list("Work");
    let driver = h.sync.spawn_background();
    settle().await;
    driver.stop();

    h.monitor.report(true);
    settle().await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 0);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_driver_keeps_running() {
    let gateway = Arc::new(LoopbackGateway::new());
    let monitor = Arc::new(ConnectivityMonitor::manual(false));
    let sync = Arc::new(SyncOrchestrator::new(
        Arc::clone(&gateway),
        LocalCache::new(Arc::new(InMemoryStore::new())),
        Arc::clone(&monitor),
        Arc::new(AppState::new()),
        SyncConfig {
            interval: Duration::ZERO,
        },
    ));
    gateway.seed_list("Work");

    let driver = sync.spawn_background();
    settle().await;
    assert!(!driver.is_finished());

    monitor.report(true);
    settle().await;
    assert!(!driver.is_finished());
    assert_eq!(gateway.calls(GatewayOp::ListTaskLists), 1);
    assert_eq!(sync.state().sync_state().status, SyncStatus::Synced);
}

// =============================================================================
// Overlap and fan-out
// =============================================================================

#[tokio::test]
async fn overlapping_sync_all_is_a_no_op() {
    let h = harness(true);
    h.gateway.seed_list("Work");
    h.gateway.hold();

    let first = tokio::spawn({
        let sync = Arc::clone(&h.sync);
        async move { sync.sync_all().await }
    });
    while h.gateway.calls(GatewayOp::ListTaskLists) == 0 {
        tokio::task::yield_now().await;
    }
    assert!(h.sync.is_syncing());

    assert_eq!(h.sync.sync_all().await, SyncOutcome::Skipped);
    assert_eq!(h.sync.sync_task_lists().await, SyncOutcome::Skipped);
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);

    h.gateway.release();
    assert_eq!(first.await.unwrap(), SyncOutcome::Synced);
    assert!(!h.sync.is_syncing());
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);
}

#[tokio::test]
async fn sync_all_fetches_tasks_once_per_list() {
    let h = harness(true);
    let work = h.gateway.seed_list("Work");

    assert_eq!(h.sync.sync_all().await, SyncOutcome::Synced);
    assert_eq!(h.gateway.calls(GatewayOp::ListTasks), 1);
    assert_eq!(h.gateway.task_queries(), vec![TaskQuery::for_list(work.id)]);

    let home = h.gateway.seed_list("Home");
    assert_eq!(h.sync.sync_all().await, SyncOutcome::Synced);
    let mut queried: Vec<_> = h.gateway.task_queries()[1..]
        .iter()
        .filter_map(|q| q.task_list)
        .collect();
    queried.sort();
    assert_eq!(queried, vec![work.id, home.id]);
}

// =============================================================================
// Periodic refresh
// =============================================================================

#[tokio::test(start_paused = true)]
async fn periodic_refresh_only_while_synced() {
    let h = harness(true);
    h.gateway.seed_list("Work");
    let _driver = h.sync.spawn_background();
    settle().await;

    // Initial status is pending: the timer leaves it to the reconnect path.
    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 0);

    assert_eq!(h.sync.sync_all().await, SyncOutcome::Synced);
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 2);

    // A failing refresh moves to `error`, which stops further ticks.
    h.gateway.fail_always(
        GatewayOp::ListTaskLists,
        GatewayError::Server {
            status: 500,
            message: "boom".into(),
        },
    );
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 3);
    assert_eq!(h.sync.state().sync_state().status, SyncStatus::Error);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 3);
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_skipped_while_offline() {
    let h = harness(true);
    h.gateway.seed_list("Work");
    assert_eq!(h.sync.sync_all().await, SyncOutcome::Synced);
    let _driver = h.sync.spawn_background();
    settle().await;

    h.monitor.report(false);
    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(h.gateway.calls(GatewayOp::ListTaskLists), 1);
}

// =============================================================================
// Real reachability probe
// =============================================================================

#[tokio::test]
async fn tcp_probe_drives_resync_when_backend_returns() {
    let store = Arc::new(TaskStore::new());
    let (addr, server) =
        tasksync_server::api::start_server_with_state("127.0.0.1:0", Arc::clone(&store))
            .await
            .unwrap();
    let base_url = format!("http://{addr}/api");

    let kv = Arc::new(InMemoryStore::new());
    let gateway =
        Arc::new(HttpGateway::new(&base_url, Duration::from_secs(2), Arc::clone(&kv)).unwrap());
    let state = Arc::new(AppState::new());
    Session::new(Arc::clone(&gateway), Arc::clone(&kv), Arc::clone(&state))
        .register("ann", "ann@example.com", "secret1")
        .await
        .unwrap();
    gateway
        .create_task_list(TaskListDraft::new("Work"))
        .await
        .unwrap();

    let probe = TcpProbe::new(addr.to_string(), Duration::from_millis(200));
    let monitor = Arc::new(ConnectivityMonitor::start(probe, Duration::from_millis(50)).await);
    assert!(monitor.is_reachable());

    let sync = Arc::new(SyncOrchestrator::new(
        Arc::clone(&gateway),
        LocalCache::new(Arc::clone(&kv)),
        Arc::clone(&monitor),
        Arc::clone(&state),
        SyncConfig {
            interval: Duration::from_secs(3600),
        },
    ));
    let _driver = sync.spawn_background();

    // Take the backend down; the probe notices and the status goes pending.
    server.abort();
    let _ = server.await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while monitor.is_reachable() {
        assert!(tokio::time::Instant::now() < deadline, "probe never failed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sync.sync_task_lists().await, SyncOutcome::Pending);

    // Bring it back on the same port with the same data.
    let (_, _server) =
        tasksync_server::api::start_server_with_state(&addr.to_string(), Arc::clone(&store))
            .await
            .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.sync_state().status != SyncStatus::Synced {
        assert!(tokio::time::Instant::now() < deadline, "no automatic resync");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.task_lists().len(), 1);
    assert_eq!(sync.cached_task_lists().await.len(), 1);
}
