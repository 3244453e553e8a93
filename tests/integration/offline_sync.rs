// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! End-to-end cache-and-resync behavior over HTTP with an on-disk cache.
//!
//! These tests validate:
//! - Offline sync attempts leave the cache unchanged and report `pending`
//! - Successful syncs overwrite `taskLists` / `tasks_<id>` with server data
//! - Failed syncs keep the last good data readable from the cache
//! - `clear_cache` removes only list/task entries and resets to `pending`
//! - A restarted client hydrates its projection from the cache while offline

use std::sync::Arc;
use std::time::Duration;

use tasksync::auth::Session;
use tasksync::cache::{
    AUTH_TOKEN_KEY, CACHE_PREFIXES, FileStore, KeyValueStore, LAST_SYNC_KEY, LocalCache,
    TASK_LISTS_KEY, TASKS_KEY_PREFIX, USER_KEY,
};
use tasksync::connectivity::ConnectivityMonitor;
use tasksync::gateway::{GatewayError, HttpGateway, RemoteGateway};
use tasksync::state::{AppState, SyncStatus};
use tasksync::sync::{SyncConfig, SyncOrchestrator, SyncOutcome};
use tasksync_proto::TaskList;
use tasksync_proto::api::{TaskDraft, TaskListDraft};
use tasksync_server::store::TaskStore;

// =============================================================================
// Helpers
// =============================================================================

struct Backend {
    base_url: String,
    store: Arc<TaskStore>,
    _handle: tokio::task::JoinHandle<()>,
}

async fn start_backend() -> Backend {
    let store = Arc::new(TaskStore::new());
    let (addr, handle) =
        tasksync_server::api::start_server_with_state("127.0.0.1:0", Arc::clone(&store))
            .await
            .expect("failed to start backend");
    Backend {
        base_url: format!("http://{addr}/api"),
        store,
        _handle: handle,
    }
}

type Orchestrator = SyncOrchestrator<HttpGateway<FileStore>, FileStore>;

struct Client {
    gateway: Arc<HttpGateway<FileStore>>,
    store: Arc<FileStore>,
    monitor: Arc<ConnectivityMonitor>,
    state: Arc<AppState>,
    sync: Orchestrator,
}

/// A client over `dir`, with reachability driven by hand.
async fn client_in(backend: &Backend, dir: &std::path::Path, online: bool) -> Client {
    let store = Arc::new(FileStore::open(dir).await.unwrap());
    let gateway = Arc::new(
        HttpGateway::new(&backend.base_url, Duration::from_secs(5), Arc::clone(&store)).unwrap(),
    );
    let monitor = Arc::new(ConnectivityMonitor::manual(online));
    let state = Arc::new(AppState::new());
    let sync = SyncOrchestrator::new(
        Arc::clone(&gateway),
        LocalCache::new(Arc::clone(&store)),
        Arc::clone(&monitor),
        Arc::clone(&state),
        SyncConfig::default(),
    );
    Client {
        gateway,
        store,
        monitor,
        state,
        sync,
    }
}

/// Register `ann` and create two lists with one task each.
async fn seed(client: &Client) -> Vec<TaskList> {
    let session = Session::new(
        Arc::clone(&client.gateway),
        Arc::clone(&client.store),
        Arc::clone(&client.state),
    );
    session
        .register("ann", "ann@example.com", "secret1")
        .await
        .unwrap();
    let mut lists = Vec::new();
    for title in ["Home", "Work"] {
        let list = client
            .gateway
            .create_task_list(TaskListDraft::new(title))
            .await
            .unwrap();
        client
            .gateway
            .create_task(TaskDraft::new(list.id, format!("{title} task")))
            .await
            .unwrap();
        lists.push(list);
    }
    lists
}

async fn raw_lists(store: &FileStore) -> Option<String> {
    store.get(TASK_LISTS_KEY).await.unwrap()
}

// =============================================================================
// Offline and failure keep the cache
// =============================================================================

#[tokio::test]
async fn offline_attempts_leave_cache_untouched() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_in(&backend, dir.path(), true).await;
    seed(&client).await;

    assert_eq!(client.sync.sync_task_lists().await, SyncOutcome::Synced);
    let before = raw_lists(&client.store).await;
    assert!(before.is_some());

    client.monitor.report(false);
    client
        .gateway
        .create_task_list(TaskListDraft::new("Added while away"))
        .await
        .unwrap();

    for _ in 0..3 {
        assert_eq!(client.sync.sync_task_lists().await, SyncOutcome::Pending);
        assert_eq!(raw_lists(&client.store).await, before);
    }
    assert_eq!(client.state.sync_state().status, SyncStatus::Pending);
    assert_eq!(client.sync.cached_task_lists().await.len(), 2);
}

#[tokio::test]
async fn successful_sync_mirrors_server() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_in(&backend, dir.path(), true).await;
    seed(&client).await;

    assert_eq!(client.sync.sync_task_lists().await, SyncOutcome::Synced);
    let remote = client.gateway.list_task_lists().await.unwrap();
    assert_eq!(client.sync.cached_task_lists().await, remote);
    assert_eq!(client.state.task_lists(), remote);
    assert_eq!(client.state.sync_state().status, SyncStatus::Synced);
}

#[tokio::test]
async fn failed_sync_keeps_last_good_data() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_in(&backend, dir.path(), true).await;
    let lists = seed(&client).await;

    assert_eq!(client.sync.sync_all().await, SyncOutcome::Synced);
    let cached_lists = client.sync.cached_task_lists().await;
    let cached_tasks = client.sync.cached_tasks(lists[0].id).await;
    let before = raw_lists(&client.store).await;

    backend.store.revoke_all_sessions().await;

    let outcome = client.sync.sync_task_lists().await;
    assert!(matches!(
        outcome,
        SyncOutcome::Failed(GatewayError::Unauthorized(_))
    ));
    let state = client.state.sync_state();
    assert_eq!(state.status, SyncStatus::Error);
    assert!(state.last_error.is_some());

    assert_eq!(raw_lists(&client.store).await, before);
    assert_eq!(client.sync.cached_task_lists().await, cached_lists);
    assert_eq!(client.sync.cached_tasks(lists[0].id).await, cached_tasks);
}

// =============================================================================
// Full sync, clear, restart
// =============================================================================

#[tokio::test]
async fn sync_all_caches_every_list_and_stamps_last_sync() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_in(&backend, dir.path(), true).await;
    let lists = seed(&client).await;

    assert!(client.sync.last_synced_at().await.is_none());
    assert_eq!(client.sync.sync_all().await, SyncOutcome::Synced);

    for list in &lists {
        let tasks = client.sync.cached_tasks(list.id).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(client.state.tasks(list.id), tasks);
    }
    let stamped = client.sync.last_synced_at().await.unwrap();
    assert_eq!(client.state.sync_state().last_sync, Some(stamped));
}

#[tokio::test]
async fn clear_cache_keeps_credentials() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_in(&backend, dir.path(), true).await;
    seed(&client).await;
    assert_eq!(client.sync.sync_all().await, SyncOutcome::Synced);

    let removed = client.sync.clear_cache().await;
    assert_eq!(removed, 3);

    let keys = client.store.keys().await.unwrap();
    assert!(
        keys.iter()
            .all(|k| !CACHE_PREFIXES.iter().any(|p| k.starts_with(p))),
        "cache keys left behind: {keys:?}"
    );
    assert!(keys.iter().any(|k| k == AUTH_TOKEN_KEY));
    assert!(keys.iter().any(|k| k == USER_KEY));
    assert!(keys.iter().any(|k| k == LAST_SYNC_KEY));
    assert_eq!(client.state.sync_state().status, SyncStatus::Pending);
    assert!(client.sync.cached_task_lists().await.is_empty());
}

#[tokio::test]
async fn deleted_list_disappears_with_its_tasks() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let client = client_in(&backend, dir.path(), true).await;
    let lists = seed(&client).await;
    let (home, work) = (lists[0].id, lists[1].id);
    let report = client
        .gateway
        .create_task(TaskDraft::new(work, "report"))
        .await
        .unwrap();

    assert_eq!(client.sync.sync_all().await, SyncOutcome::Synced);
    client.state.set_current_list(Some(work));
    assert!(client.state.task(report.id).is_some());

    client.gateway.delete_task_list(work).await.unwrap();
    assert_eq!(client.sync.sync_all().await, SyncOutcome::Synced);

    assert_eq!(client.state.task_lists().len(), 1);
    assert_eq!(client.state.task(report.id), None);
    assert!(client.state.tasks(work).is_empty());
    assert_eq!(client.state.current_list(), None);
    assert_eq!(client.state.tasks(home).len(), 1);

    let mut keys = client.store.keys().await.unwrap();
    keys.retain(|k| k.starts_with(TASKS_KEY_PREFIX));
    assert_eq!(keys, vec![format!("{TASKS_KEY_PREFIX}{home}")]);
    assert!(client.sync.cached_tasks(work).await.is_empty());
}

#[tokio::test]
async fn restarted_client_reads_cache_while_offline() {
    let backend = start_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let lists = {
        let client = client_in(&backend, dir.path(), true).await;
        let lists = seed(&client).await;
        assert_eq!(client.sync.sync_all().await, SyncOutcome::Synced);
        lists
    };

    let restarted = client_in(&backend, dir.path(), false).await;
    assert_eq!(restarted.sync.load_cached().await, 2);
    assert_eq!(restarted.state.task_lists().len(), 2);
    for list in &lists {
        assert_eq!(restarted.state.tasks(list.id).len(), 1);
    }
    assert_eq!(restarted.sync.sync_all().await, SyncOutcome::Pending);
    assert_eq!(restarted.state.task_lists().len(), 2);
}
