//! Authentication request and response bodies.

use serde::{Deserialize, Serialize};

use crate::model::User;

/// Body of `POST /auth/local`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// E-mail address or username.
    pub identifier: String,
    /// Plain-text password (sent over the transport only).
    pub password: String,
}

/// Body of `POST /auth/local/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Desired username.
    pub username: String,
    /// E-mail address.
    pub email: String,
    /// Plain-text password.
    pub password: String,
}

/// Successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer credential for subsequent requests.
    #[serde(alias = "token")]
    pub jwt: String,
    /// The authenticated user.
    pub user: User,
}

/// Body of `POST /auth/forgot-password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    /// Address to send the reset code to.
    pub email: String,
}

/// Body of `POST /auth/reset-password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Reset code delivered out of band.
    pub code: String,
    /// New password.
    pub password: String,
    /// Must equal `password`.
    pub password_confirmation: String,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    /// Always `true` on success.
    pub ok: bool,
}

impl OkResponse {
    /// The success acknowledgement.
    pub const OK: Self = Self { ok: true };
}
