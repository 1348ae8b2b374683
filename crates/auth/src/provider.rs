//! Identity provider contracts.
//!
//! The provider is an external collaborator; this module only fixes the
//! shape of the calls. Adapters live in `contacthub-infra`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use contacthub_core::{AppError, ErrorCode, UserId};

use crate::{AuthStateChange, Session, UserIdentity, UserMetadata};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("user not found")]
    UserNotFound,

    #[error("no active session")]
    NoSession,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidToken
                | ProviderError::NoSession
                | ProviderError::Upstream { status: 401, .. }
        )
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidToken | ProviderError::NoSession => {
                AppError::authentication(err.to_string())
            }
            ProviderError::InvalidCredentials(msg) => {
                AppError::new(ErrorCode::AuthenticationError, contacthub_core::readable_message(&msg))
            }
            ProviderError::UserNotFound => AppError::not_found("user not found"),
            ProviderError::Network(msg) => AppError::network(msg),
            ProviderError::Upstream { status, message } => AppError::from_status(status, message),
            ProviderError::Other(msg) => AppError::unknown(msg),
        }
    }
}

/// Outcome of a sign-up; `session` is `None` until the email is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: UserIdentity,
    pub session: Option<Session>,
}

/// Where the current session of an execution context comes from.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// The live session, if any.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Force the provider to reissue the session so metadata changes made
    /// out-of-band become visible.
    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError>;
}

/// End-user client of the provider (one per client session).
#[async_trait]
pub trait AuthClient: SessionSource {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ProviderError>;

    /// Creates the account with `{role: member, is_approved: false}` in its
    /// user metadata. App metadata stays empty, so the new user is pending.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Subscribe to `SIGNED_IN` / `SIGNED_OUT` notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}

/// Privileged (service-role) access to the provider. Server-only.
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// Resolve a bearer token to the user's current identity.
    async fn get_user(&self, access_token: &str) -> Result<UserIdentity, ProviderError>;

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<UserIdentity>, ProviderError>;

    /// Replace the user's metadata bag. Callers merge before calling.
    async fn update_user_metadata(
        &self,
        id: UserId,
        metadata: UserMetadata,
    ) -> Result<UserIdentity, ProviderError>;

    async fn delete_user(&self, id: UserId) -> Result<(), ProviderError>;

    async fn list_users(&self) -> Result<Vec<UserIdentity>, ProviderError>;
}

/// Server-side session of a single request, backed by its bearer token.
///
/// Each read resolves the token against the provider, so the identity is
/// always the provider's current view and never a cached copy.
pub struct BearerSession {
    admin: Arc<dyn IdentityAdmin>,
    token: Option<String>,
}

impl BearerSession {
    pub fn new(admin: Arc<dyn IdentityAdmin>, token: Option<String>) -> Self {
        Self { admin, token }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[async_trait]
impl SessionSource for BearerSession {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };

        match self.admin.get_user(token).await {
            Ok(user) => Ok(Some(Session {
                access_token: token.to_string(),
                refresh_token: None,
                expires_at: None,
                user,
            })),
            Err(e) if e.is_auth_failure() => Ok(None),
            Err(ProviderError::UserNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        self.get_session().await
    }
}
