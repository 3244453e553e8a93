//! Remote data gateway: typed access to the list, task and auth endpoints.
//!
//! [`RemoteGateway`] and [`AuthProvider`] are the seams the rest of the
//! client talks to. Two implementations exist:
//!
//! - [`http::HttpGateway`] speaks the REST surface over HTTP.
//! - [`loopback::LoopbackGateway`] keeps everything in memory and adds call
//!   counters, failure injection and a hold switch for tests.

pub mod http;
pub mod loopback;

use tasksync_proto::api::{TaskDraft, TaskListDraft, TaskListPatch, TaskPatch, TaskQuery};
use tasksync_proto::auth::{AuthResponse, RegisterRequest, ResetPasswordRequest};
use tasksync_proto::{ListId, Task, TaskId, TaskList, User, UserId};

pub use http::HttpGateway;
pub use loopback::{GatewayOp, LoopbackGateway};

/// Failures of a gateway call, classified by HTTP status class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// 401: missing, expired or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 403: authenticated but not allowed to touch the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 404: the resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// 400/422 from the server, or a request rejected before sending.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Any other non-success status, or an undecodable success body.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, if any.
        message: String,
    },

    /// The request never completed (connection refused, reset, offline).
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the per-request timeout.
    #[error("request timed out")]
    Timeout,
}

impl GatewayError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            400 | 422 => Self::Validation(message),
            status => Self::Server { status, message },
        }
    }

    /// Short tag of the error class, e.g. `"unauthorized"` or `"network"`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Server { .. } => "server",
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
        }
    }

    /// Returns `true` for failures where the request never reached a server.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// CRUD access to task lists and tasks.
pub trait RemoteGateway: Send + Sync + 'static {
    /// All lists the caller owns or collaborates on.
    fn list_task_lists(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<TaskList>, GatewayError>> + Send;

    /// One list by id.
    fn get_task_list(
        &self,
        id: ListId,
    ) -> impl std::future::Future<Output = Result<TaskList, GatewayError>> + Send;

    /// Create a list owned by the caller.
    fn create_task_list(
        &self,
        draft: TaskListDraft,
    ) -> impl std::future::Future<Output = Result<TaskList, GatewayError>> + Send;

    /// Change a list (owner only).
    fn update_task_list(
        &self,
        id: ListId,
        patch: TaskListPatch,
    ) -> impl std::future::Future<Output = Result<TaskList, GatewayError>> + Send;

    /// Delete a list and its tasks (owner only).
    fn delete_task_list(
        &self,
        id: ListId,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Tasks matching `query`.
    fn list_tasks(
        &self,
        query: TaskQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, GatewayError>> + Send;

    /// One task by id.
    fn get_task(
        &self,
        id: TaskId,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Create a task in an accessible list.
    fn create_task(
        &self,
        draft: TaskDraft,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Change a task.
    fn update_task(
        &self,
        id: TaskId,
        patch: TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, GatewayError>> + Send;

    /// Delete a task.
    fn delete_task(
        &self,
        id: TaskId,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Share `list` with `user`.
    fn add_collaborator(
        &self,
        list: ListId,
        user: UserId,
    ) -> impl std::future::Future<Output = Result<TaskList, GatewayError>> + Send {
        self.update_task_list(list, TaskListPatch::connect(user))
    }

    /// Stop sharing `list` with `user`.
    fn remove_collaborator(
        &self,
        list: ListId,
        user: UserId,
    ) -> impl std::future::Future<Output = Result<TaskList, GatewayError>> + Send {
        self.update_task_list(list, TaskListPatch::disconnect(user))
    }

    /// Every task of one list.
    fn tasks_for_list(
        &self,
        list: ListId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, GatewayError>> + Send {
        self.list_tasks(TaskQuery::for_list(list))
    }
}

/// Account operations.
pub trait AuthProvider: Send + Sync + 'static {
    /// Exchange an identifier (username or e-mail) and password for a token.
    fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<AuthResponse, GatewayError>> + Send;

    /// Create an account and sign in.
    fn register(
        &self,
        request: RegisterRequest,
    ) -> impl std::future::Future<Output = Result<AuthResponse, GatewayError>> + Send;

    /// Ask the backend to send a reset code to `email`.
    fn forgot_password(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send;

    /// Set a new password with a reset code; signs the user in.
    fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> impl std::future::Future<Output = Result<AuthResponse, GatewayError>> + Send;

    /// The user the current credentials belong to.
    fn current_user(&self) -> impl std::future::Future<Output = Result<User, GatewayError>> + Send;
}
