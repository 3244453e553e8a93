//! REST surface of the reference backend.
//!
//! Every route lives under `/api`. List and task bodies travel in a
//! [`DataEnvelope`] both ways; auth endpoints use bare bodies. Errors are
//! rendered by [`ApiError`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::task::JoinHandle;

use tasksync_proto::api::{
    DataEnvelope, TaskDraft, TaskListDraft, TaskListPatch, TaskPatch, TaskQuery,
};
use tasksync_proto::auth::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, OkResponse, RegisterRequest,
    ResetPasswordRequest,
};
use tasksync_proto::{ListId, Task, TaskId, TaskList, User};

use crate::error::ApiError;
use crate::store::TaskStore;

type Shared = State<Arc<TaskStore>>;
type ApiResult<T> = Result<Json<T>, ApiError>;

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<TaskStore>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        store: &Arc<TaskStore>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        store.authenticate(token).await.map(Self)
    }
}

/// Build the application router over `store`.
pub fn router(store: Arc<TaskStore>) -> Router {
    let api = Router::new()
        .route("/auth/local", post(login))
        .route("/auth/local/register", post(register))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/users/me", get(me))
        .route("/task-lists", get(list_lists).post(create_list))
        .route(
            "/task-lists/{id}",
            get(get_list).put(update_list).delete(delete_list),
        )
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        );
    Router::new().nest("/api", api).with_state(store)
}

/// Starts the backend with an empty [`TaskStore`].
///
/// Pass `127.0.0.1:0` to let the OS choose a port; the bound address is
/// returned alongside the server task.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    start_server_with_state(addr, Arc::new(TaskStore::new())).await
}

/// Starts the backend over an existing [`TaskStore`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    store: Arc<TaskStore>,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

async fn login(State(store): Shared, Json(req): Json<LoginRequest>) -> ApiResult<AuthResponse> {
    store.login(req).await.map(Json)
}

async fn register(
    State(store): Shared,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    store.register(req).await.map(Json)
}

async fn forgot_password(
    State(store): Shared,
    Json(req): Json<ForgotPasswordRequest>,
) -> Json<OkResponse> {
    store.forgot_password(&req.email).await;
    Json(OkResponse::OK)
}

async fn reset_password(
    State(store): Shared,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<AuthResponse> {
    store.reset_password(req).await.map(Json)
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

// ---------------------------------------------------------------------------
// Task lists
// ---------------------------------------------------------------------------

async fn list_lists(
    State(store): Shared,
    AuthUser(user): AuthUser,
) -> Json<DataEnvelope<Vec<TaskList>>> {
    Json(DataEnvelope::new(store.lists_for(user.id).await))
}

async fn get_list(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Path(id): Path<ListId>,
) -> ApiResult<DataEnvelope<TaskList>> {
    store.get_list(user.id, id).await.map(wrap)
}

async fn create_list(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Json(body): Json<DataEnvelope<TaskListDraft>>,
) -> ApiResult<DataEnvelope<TaskList>> {
    store.create_list(user.id, body.data).await.map(wrap)
}

async fn update_list(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Path(id): Path<ListId>,
    Json(body): Json<DataEnvelope<TaskListPatch>>,
) -> ApiResult<DataEnvelope<TaskList>> {
    store.update_list(user.id, id, body.data).await.map(wrap)
}

async fn delete_list(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Path(id): Path<ListId>,
) -> ApiResult<DataEnvelope<TaskList>> {
    store.delete_list(user.id, id).await.map(wrap)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn list_tasks(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Query(query): Query<TaskQuery>,
) -> ApiResult<DataEnvelope<Vec<Task>>> {
    store.list_tasks(user.id, &query).await.map(wrap)
}

async fn get_task(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Path(id): Path<TaskId>,
) -> ApiResult<DataEnvelope<Task>> {
    store.get_task(user.id, id).await.map(wrap)
}

async fn create_task(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Json(body): Json<DataEnvelope<TaskDraft>>,
) -> ApiResult<DataEnvelope<Task>> {
    store.create_task(user.id, body.data).await.map(wrap)
}

async fn update_task(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Path(id): Path<TaskId>,
    Json(body): Json<DataEnvelope<TaskPatch>>,
) -> ApiResult<DataEnvelope<Task>> {
    store.update_task(user.id, id, body.data).await.map(wrap)
}

async fn delete_task(
    State(store): Shared,
    AuthUser(user): AuthUser,
    Path(id): Path<TaskId>,
) -> ApiResult<DataEnvelope<Task>> {
    store.delete_task(user.id, id).await.map(wrap)
}

fn wrap<T>(data: T) -> Json<DataEnvelope<T>> {
    Json(DataEnvelope::new(data))
}
