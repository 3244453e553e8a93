//! HTTP implementation of the gateway traits (reqwest).
//!
//! Every request goes through [`HttpGateway::request`], which attaches the
//! stored bearer credential, and every response through
//! [`HttpGateway::execute`], which maps failures to [`GatewayError`] and
//! forgets the stored credentials (and the projected user) on a 401.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use tasksync_proto::api::{
    DataEnvelope, ErrorBody, TaskDraft, TaskListDraft, TaskListPatch, TaskPatch, TaskQuery,
};
use tasksync_proto::auth::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, OkResponse, RegisterRequest,
    ResetPasswordRequest,
};
use tasksync_proto::{ListId, Task, TaskId, TaskList, User};

use super::{AuthProvider, GatewayError, RemoteGateway};
use crate::cache::{AUTH_TOKEN_KEY, KeyValueStore, USER_KEY};
use crate::state::AppState;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors constructing an [`HttpGateway`].
#[derive(Debug, thiserror::Error)]
pub enum HttpSetupError {
    /// The base URL could not be parsed or cannot carry paths.
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client could not be built (TLS backend initialisation).
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Gateway speaking the REST surface over HTTP.
pub struct HttpGateway<S: KeyValueStore> {
    client: reqwest::Client,
    base: Url,
    store: Arc<S>,
    state: Option<Arc<AppState>>,
}

impl<S: KeyValueStore> HttpGateway<S> {
    /// Create a gateway for `base_url` (e.g. `http://localhost:1337/api`).
    ///
    /// Credentials are read from and cleared in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpSetupError`] if the URL is unusable or the client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration, store: Arc<S>) -> Result<Self, HttpSetupError> {
        let invalid = |reason: String| HttpSetupError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }
        // Url::join replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            store,
            state: None,
        })
    }

    /// Also sign the user out of `state` when the backend rejects the
    /// stored credentials.
    #[must_use]
    pub fn with_state(mut self, state: Arc<AppState>) -> Self {
        self.state = Some(state);
        self
    }

    /// The normalized base URL (always ends in `/`).
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base
            .join(path)
            .map_err(|e| GatewayError::Validation(format!("bad endpoint {path:?}: {e}")))
    }

    /// Build a request and attach the stored bearer credential, if any.
    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        let url = self.endpoint(path)?;
        let mut builder = self.client.request(method, url);
        match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(Some(token)) => builder = builder.bearer_auth(token),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "could not read stored credential"),
        }
        Ok(builder)
    }

    /// Send a request and map every non-success outcome to a [`GatewayError`].
    async fn execute(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        if status == StatusCode::UNAUTHORIZED {
            self.forget_credentials().await;
        }
        tracing::debug!(status = status.as_u16(), %message, "request failed");
        Err(GatewayError::from_status(status.as_u16(), message))
    }

    async fn forget_credentials(&self) {
        tracing::warn!("credentials rejected, clearing stored session");
        for key in [AUTH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key, error = %e, "failed to clear credential");
            }
        }
        if let Some(state) = &self.state {
            state.set_user(None);
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.execute(builder).await?;
        let status = response.status().as_u16();
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Server {
                    status,
                    message: format!("undecodable response: {e}"),
                }
            }
        })
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let builder = self.request(Method::GET, path).await?;
        self.fetch::<DataEnvelope<T>>(builder)
            .await
            .map(DataEnvelope::into_inner)
    }

    async fn send_data<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: B,
    ) -> Result<T, GatewayError> {
        let builder = self
            .request(method, path)
            .await?
            .json(&DataEnvelope::new(body));
        self.fetch::<DataEnvelope<T>>(builder)
            .await
            .map(DataEnvelope::into_inner)
    }

    async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        let builder = self.request(Method::DELETE, path).await?;
        self.execute(builder).await.map(drop)
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(e.to_string())
    }
}

impl<S: KeyValueStore> RemoteGateway for HttpGateway<S> {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>, GatewayError> {
        self.get_data("task-lists").await
    }

    async fn get_task_list(&self, id: ListId) -> Result<TaskList, GatewayError> {
        self.get_data(&format!("task-lists/{id}")).await
    }

    async fn create_task_list(&self, draft: TaskListDraft) -> Result<TaskList, GatewayError> {
        draft
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        self.send_data(Method::POST, "task-lists", draft).await
    }

    async fn update_task_list(
        &self,
        id: ListId,
        patch: TaskListPatch,
    ) -> Result<TaskList, GatewayError> {
        patch
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        self.send_data(Method::PUT, &format!("task-lists/{id}"), patch)
            .await
    }

    async fn delete_task_list(&self, id: ListId) -> Result<(), GatewayError> {
        self.delete(&format!("task-lists/{id}")).await
    }

    async fn list_tasks(&self, query: TaskQuery) -> Result<Vec<Task>, GatewayError> {
        let builder = self
            .request(Method::GET, "tasks")
            .await?
            .query(&query.to_pairs());
        self.fetch::<DataEnvelope<Vec<Task>>>(builder)
            .await
            .map(DataEnvelope::into_inner)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, GatewayError> {
        self.get_data(&format!("tasks/{id}")).await
    }

    async fn create_task(&self, draft: TaskDraft) -> Result<Task, GatewayError> {
        draft
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        self.send_data(Method::POST, "tasks", draft).await
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, GatewayError> {
        patch
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        self.send_data(Method::PUT, &format!("tasks/{id}"), patch)
            .await
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        self.delete(&format!("tasks/{id}")).await
    }
}

impl<S: KeyValueStore> AuthProvider for HttpGateway<S> {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        let body = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let builder = self.request(Method::POST, "auth/local").await?.json(&body);
        self.fetch(builder).await
    }

    async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, GatewayError> {
        let builder = self
            .request(Method::POST, "auth/local/register")
            .await?
            .json(&request);
        self.fetch(builder).await
    }

    async fn forgot_password(&self, email: &str) -> Result<(), GatewayError> {
        let body = ForgotPasswordRequest {
            email: email.to_string(),
        };
        let builder = self
            .request(Method::POST, "auth/forgot-password")
            .await?
            .json(&body);
        self.fetch::<OkResponse>(builder).await.map(drop)
    }

    async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<AuthResponse, GatewayError> {
        let builder = self
            .request(Method::POST, "auth/reset-password")
            .await?
            .json(&request);
        self.fetch(builder).await
    }

    async fn current_user(&self) -> Result<User, GatewayError> {
        let builder = self.request(Method::GET, "users/me").await?;
        self.fetch(builder).await
    }
}
