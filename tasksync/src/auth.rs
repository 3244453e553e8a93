//! Session management: credentials persisted in the key-value store and the
//! signed-in user published into [`AppState`].

use std::sync::Arc;

use tasksync_proto::User;
use tasksync_proto::auth::{AuthResponse, RegisterRequest, ResetPasswordRequest};

use crate::cache::{AUTH_TOKEN_KEY, KeyValueStore, StoreError, USER_KEY};
use crate::gateway::{AuthProvider, GatewayError};
use crate::state::AppState;

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backend rejected or could not serve the request.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Credentials could not be read or written.
    #[error("credential storage failed: {0}")]
    Store(#[from] StoreError),

    /// The stored user record could not be encoded.
    #[error("could not encode user record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The new password and its confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Sign-in state over an [`AuthProvider`] and a credential store.
pub struct Session<G: AuthProvider, S: KeyValueStore> {
    provider: Arc<G>,
    store: Arc<S>,
    state: Arc<AppState>,
}

impl<G: AuthProvider, S: KeyValueStore> Session<G, S> {
    /// Create a session manager.
    pub const fn new(provider: Arc<G>, store: Arc<S>, state: Arc<AppState>) -> Self {
        Self {
            provider,
            store,
            state,
        }
    }

    /// Sign in with a username or e-mail address.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the backend rejects the credentials or they
    /// cannot be stored.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, SessionError> {
        let response = self.provider.login(identifier, password).await?;
        self.persist(response).await
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if registration fails or the credentials
    /// cannot be stored.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, SessionError> {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.provider.register(request).await?;
        self.persist(response).await
    }

    /// Forget the stored credentials and the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if a credential cannot be removed.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.store.remove(AUTH_TOKEN_KEY).await?;
        self.store.remove(USER_KEY).await?;
        self.state.set_user(None);
        tracing::info!("signed out");
        Ok(())
    }

    /// Load a previously stored session, if both token and user are present.
    ///
    /// A corrupt user record is discarded and treated as signed out.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be read.
    pub async fn restore(&self) -> Result<Option<User>, SessionError> {
        let token = self.store.get(AUTH_TOKEN_KEY).await?;
        let raw_user = self.store.get(USER_KEY).await?;
        let (Some(_), Some(raw_user)) = (token, raw_user) else {
            self.state.set_user(None);
            return Ok(None);
        };
        match serde_json::from_str::<User>(&raw_user) {
            Ok(user) => {
                tracing::debug!(user = %user.username, "session restored");
                self.state.set_user(Some(user.clone()));
                Ok(Some(user))
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored user record is corrupt, signing out");
                self.logout().await?;
                Ok(None)
            }
        }
    }

    /// Whether a credential is stored.
    pub async fn is_authenticated(&self) -> bool {
        match self.store.get(AUTH_TOKEN_KEY).await {
            Ok(token) => token.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read stored credential");
                false
            }
        }
    }

    /// Ask the backend who the stored credential belongs to and refresh the
    /// stored user record.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Gateway`] with `Unauthorized` if the credential
    /// is missing or rejected.
    pub async fn current_user(&self) -> Result<User, SessionError> {
        let user = self.provider.current_user().await?;
        self.store
            .set(USER_KEY, serde_json::to_string(&user)?)
            .await?;
        self.state.set_user(Some(user.clone()));
        Ok(user)
    }

    /// Request a password reset code for `email`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Gateway`] if the request fails.
    pub async fn forgot_password(&self, email: &str) -> Result<(), SessionError> {
        self.provider.forgot_password(email).await?;
        Ok(())
    }

    /// Set a new password using a reset code, then sign in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PasswordMismatch`] before contacting the
    /// backend if the two passwords differ.
    pub async fn reset_password(
        &self,
        code: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<User, SessionError> {
        if password != confirmation {
            return Err(SessionError::PasswordMismatch);
        }
        let request = ResetPasswordRequest {
            code: code.to_string(),
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
        };
        let response = self.provider.reset_password(request).await?;
        self.persist(response).await
    }

    async fn persist(&self, response: AuthResponse) -> Result<User, SessionError> {
        let AuthResponse { jwt, user } = response;
        self.store.set(AUTH_TOKEN_KEY, jwt).await?;
        self.store
            .set(USER_KEY, serde_json::to_string(&user)?)
            .await?;
        tracing::info!(user = %user.username, "signed in");
        self.state.set_user(Some(user.clone()));
        Ok(user)
    }
}
