//! Request failures and their JSON representation.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tasksync_proto::api::{ErrorBody, ValidationError};

/// A failed request, rendered as an [`ErrorBody`] with the matching status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// 400: malformed or missing input.
    #[error("{0}")]
    BadRequest(String),

    /// 401: no valid bearer credential.
    #[error("{0}")]
    Unauthorized(String),

    /// 403: the caller may not touch this resource.
    #[error("{0}")]
    Forbidden(String),

    /// 404: no such resource.
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    /// HTTP status of the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Error class name carried in the body.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "ValidationError",
            Self::Unauthorized(_) => "UnauthorizedError",
            Self::Forbidden(_) => "ForbiddenError",
            Self::NotFound(_) => "NotFoundError",
        }
    }

    /// The JSON body of the error.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.status().as_u16(), self.name(), self.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
