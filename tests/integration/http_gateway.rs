// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the REST gateway against a live `tasksync-server`.
//!
//! These tests validate:
//! - List and task CRUD round-trips through the `{data: ...}` envelope
//! - Backend errors map onto `GatewayError` variants (400/403/404)
//! - A 401 clears the stored credentials and the signed-in user
//! - Requests that outlive the per-request timeout surface as `Timeout`
//! - Collaborators see shared lists and `assignedTo` queries span lists

use std::sync::Arc;
use std::time::Duration;

use tasksync::auth::Session;
use tasksync::cache::{AUTH_TOKEN_KEY, InMemoryStore, KeyValueStore, USER_KEY};
use tasksync::gateway::{GatewayError, HttpGateway, RemoteGateway};
use tasksync::state::AppState;
use tasksync_proto::api::{TaskDraft, TaskListDraft, TaskListPatch, TaskPatch, TaskQuery};
use tasksync_proto::{ListId, TaskStatus, User};
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

struct Client {
    gateway: Arc<HttpGateway<InMemoryStore>>,
    store: Arc<InMemoryStore>,
    state: Arc<AppState>,
    user: User,
}

/// A signed-in client for a freshly registered user `name`.
async fn signed_in(backend: &Backend, name: &str) -> Client {
    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(AppState::new());
    let gateway = Arc::new(
        HttpGateway::new(&backend.base_url, Duration::from_secs(5), Arc::clone(&store))
            .unwrap()
            .with_state(Arc::clone(&state)),
    );
    let session = Session::new(
        Arc::clone(&gateway),
        Arc::clone(&store),
        Arc::clone(&state),
    );
    let user = session
        .register(name, &format!("{name}@example.com"), "secret1")
        .await
        .unwrap();
    Client {
        gateway,
        store,
        state,
        user,
    }
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn list_and_task_crud_round_trip() {
    let backend = start_backend().await;
    let ann = signed_in(&backend, "ann").await;
    let gw = &ann.gateway;

    let mut draft = TaskListDraft::new("Groceries");
    draft.description = "weekly".into();
    let list = gw.create_task_list(draft).await.unwrap();
    assert_eq!(list.owner, ann.user.id);
    assert_eq!(list.description, "weekly");

    let renamed = gw
        .update_task_list(
            list.id,
            TaskListPatch {
                title: Some("Food".into()),
                ..TaskListPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Food");

    let mut task_draft = TaskDraft::new(list.id, "milk");
    task_draft.estimated_minutes = 5;
    let task = gw.create_task(task_draft).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.task_list, list.id);

    let done = gw
        .update_task(task.id, TaskPatch::status(TaskStatus::Completed))
        .await
        .unwrap();
    assert!(done.completed_at.is_some());

    let tasks = gw.tasks_for_list(list.id).await.unwrap();
    assert_eq!(tasks, vec![done.clone()]);
    let fetched = gw.get_task_list(list.id).await.unwrap();
    assert_eq!(fetched.tasks, vec![done.clone()]);

    let completed = gw
        .list_tasks(TaskQuery::for_list_with_status(list.id, TaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);

    gw.delete_task(task.id).await.unwrap();
    assert!(matches!(
        gw.get_task(task.id).await,
        Err(GatewayError::NotFound(_))
    ));

    gw.delete_task_list(list.id).await.unwrap();
    assert!(gw.list_task_lists().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_resources_are_not_found() {
    let backend = start_backend().await;
    let ann = signed_in(&backend, "ann").await;
    let err = ann.gateway.get_task_list(ListId::new(9999)).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn task_query_without_scope_is_a_validation_error() {
    let backend = start_backend().await;
    let ann = signed_in(&backend, "ann").await;
    let err = ann
        .gateway
        .list_tasks(TaskQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
}

// =============================================================================
// Sharing and access
// =============================================================================

#[tokio::test]
async fn strangers_are_forbidden_and_collaborators_allowed() {
    let backend = start_backend().await;
    let ann = signed_in(&backend, "ann").await;
    let bob = signed_in(&backend, "bob").await;

    let list = ann
        .gateway
        .create_task_list(TaskListDraft::new("Project"))
        .await
        .unwrap();

    let err = bob.gateway.get_task_list(list.id).await.unwrap_err();
    assert!(matches!(err, GatewayError::Forbidden(_)));
    assert!(bob.gateway.list_task_lists().await.unwrap().is_empty());

    let shared = ann
        .gateway
        .add_collaborator(list.id, bob.user.id)
        .await
        .unwrap();
    assert!(shared.collaborators.contains(&bob.user.id));

    let visible = bob.gateway.list_task_lists().await.unwrap();
    assert_eq!(visible.len(), 1);
    bob.gateway
        .create_task(TaskDraft::new(list.id, "from bob"))
        .await
        .unwrap();

    // Collaborators may not manage the list itself.
    let err = bob.gateway.delete_task_list(list.id).await.unwrap_err();
    assert!(matches!(err, GatewayError::Forbidden(_)));

    ann.gateway
        .remove_collaborator(list.id, bob.user.id)
        .await
        .unwrap();
    assert!(bob.gateway.list_task_lists().await.unwrap().is_empty());
}

#[tokio::test]
async fn assigned_tasks_span_lists() {
    let backend = start_backend().await;
    let ann = signed_in(&backend, "ann").await;

    for title in ["Home", "Work"] {
        let list = ann
            .gateway
            .create_task_list(TaskListDraft::new(title))
            .await
            .unwrap();
        let mut draft = TaskDraft::new(list.id, format!("{title} chore"));
        draft.assigned_to = Some(ann.user.id);
        ann.gateway.create_task(draft).await.unwrap();
        ann.gateway
            .create_task(TaskDraft::new(list.id, "unassigned"))
            .await
            .unwrap();
    }

    let mine = ann
        .gateway
        .list_tasks(TaskQuery::assigned_to(ann.user.id))
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|t| t.assigned_to == Some(ann.user.id)));
}

// =============================================================================
// Credentials
// =============================================================================

#[tokio::test]
async fn unauthorized_response_clears_credentials() {
    let backend = start_backend().await;
    let ann = signed_in(&backend, "ann").await;
    assert!(ann.store.get(AUTH_TOKEN_KEY).await.unwrap().is_some());
    assert_eq!(ann.state.user(), Some(ann.user.clone()));

    backend.store.revoke_all_sessions().await;

    let err = ann.gateway.list_task_lists().await.unwrap_err();
    assert!(matches!(err, GatewayError::Unauthorized(_)));
    assert_eq!(ann.store.get(AUTH_TOKEN_KEY).await.unwrap(), None);
    assert_eq!(ann.store.get(USER_KEY).await.unwrap(), None);
    assert_eq!(ann.state.user(), None);
}

#[tokio::test]
async fn requests_without_credentials_are_unauthorized() {
    let backend = start_backend().await;
    let gateway = HttpGateway::new(
        &backend.base_url,
        Duration::from_secs(5),
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();
    assert!(matches!(
        gateway.list_task_lists().await,
        Err(GatewayError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    // Bind then drop a listener to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = HttpGateway::new(
        &format!("http://{addr}/api"),
        Duration::from_secs(2),
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();
    let err = gateway.list_task_lists().await.unwrap_err();
    assert!(err.is_transport(), "expected transport error, got {err:?}");
}

#[tokio::test]
async fn silent_backend_times_out() {
    // Accept connections and hold them open without ever answering.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let gateway = HttpGateway::new(
        &format!("http://{addr}/api"),
        Duration::from_millis(200),
        Arc::new(InMemoryStore::new()),
    )
    .unwrap();
    let started = std::time::Instant::now();
    let err = gateway.list_task_lists().await.unwrap_err();
    assert_eq!(err, GatewayError::Timeout);
    assert_eq!(err.kind(), "timeout");
    assert!(err.is_transport());
    assert!(started.elapsed() < Duration::from_secs(5));
}
