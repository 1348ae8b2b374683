//! Hosted identity provider adapter (GoTrue `/auth/v1` REST API).
//!
//! [`GoTrueAdmin`] uses the service-role key and must only run server-side.
//! [`GoTrueAuthClient`] uses the public key and keeps one end-user session.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use contacthub_auth::{
    AuthClient, AuthStateChange, IdentityAdmin, ProviderError, Session, SessionSource,
    SignUpOutcome, UserIdentity, UserMetadata, sign_up_metadata,
};
use contacthub_core::UserId;

const EVENT_CAPACITY: usize = 16;
const LIST_PAGE_SIZE: usize = 1000;

/// Connection settings for the hosted provider.
#[derive(Clone)]
pub struct GoTrueConfig {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: String,
}

impl std::fmt::Debug for GoTrueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrueConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("service_role_key", &"<redacted>")
            .finish()
    }
}

impl GoTrueConfig {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserIdentity,
}

impl From<TokenResponse> for Session {
    fn from(t: TokenResponse) -> Self {
        Session {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_at: t.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            user: t.user,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<UserIdentity>,
}

async fn send(request: RequestBuilder, operation: &str) -> Result<Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(format!("{operation}: {e}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or(body);
    tracing::debug!(operation, status = status.as_u16(), %message, "identity provider rejected request");

    Err(match status {
        StatusCode::UNAUTHORIZED => ProviderError::InvalidToken,
        StatusCode::NOT_FOUND => ProviderError::UserNotFound,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::InvalidCredentials(message)
        }
        _ => ProviderError::Upstream {
            status: status.as_u16(),
            message,
        },
    })
}

async fn parse<T: for<'de> Deserialize<'de>>(
    response: Response,
    operation: &str,
) -> Result<T, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::Other(format!("parse {operation}: {e}")))
}

/// Service-role access to the provider.
pub struct GoTrueAdmin {
    http: reqwest::Client,
    config: GoTrueConfig,
}

impl GoTrueAdmin {
    pub fn new(config: GoTrueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn admin_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
    }
}

#[async_trait]
impl IdentityAdmin for GoTrueAdmin {
    async fn get_user(&self, access_token: &str) -> Result<UserIdentity, ProviderError> {
        let request = self
            .http
            .get(self.config.endpoint("/user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token);
        let response = send(request, "get user").await.map_err(|e| match e {
            ProviderError::Upstream { status: 403, .. } => ProviderError::InvalidToken,
            other => other,
        })?;
        parse(response, "user").await
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<UserIdentity>, ProviderError> {
        let request = self.admin_request(Method::GET, &format!("/admin/users/{id}"));
        match send(request, "get user by id").await {
            Ok(response) => parse(response, "user").await.map(Some),
            Err(ProviderError::UserNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_user_metadata(
        &self,
        id: UserId,
        metadata: UserMetadata,
    ) -> Result<UserIdentity, ProviderError> {
        let request = self
            .admin_request(Method::PUT, &format!("/admin/users/{id}"))
            .json(&json!({ "app_metadata": metadata }));
        let response = send(request, "update user").await?;
        parse(response, "user").await
    }

    async fn delete_user(&self, id: UserId) -> Result<(), ProviderError> {
        let request = self.admin_request(Method::DELETE, &format!("/admin/users/{id}"));
        send(request, "delete user").await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserIdentity>, ProviderError> {
        let mut all = Vec::new();
        for page in 1.. {
            let request = self
                .admin_request(Method::GET, "/admin/users")
                .query(&[("page", page.to_string()), ("per_page", LIST_PAGE_SIZE.to_string())]);
            let list: UserList = parse(send(request, "list users").await?, "user list").await?;
            let fetched = list.users.len();
            all.extend(list.users);
            if fetched < LIST_PAGE_SIZE {
                break;
            }
        }
        Ok(all)
    }
}

/// End-user client holding one session.
pub struct GoTrueAuthClient {
    http: reqwest::Client,
    config: GoTrueConfig,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl GoTrueAuthClient {
    pub fn new(config: GoTrueConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            config,
            current: RwLock::new(None),
            events,
        }
    }

    fn public_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
    }

    fn store(&self, session: Option<Session>) {
        if let Ok(mut current) = self.current.write() {
            *current = session;
        }
    }

    fn current(&self) -> Option<Session> {
        self.current.read().ok().and_then(|s| s.clone())
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, ProviderError> {
        let request = self
            .public_request(Method::POST, "/token")
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let token: TokenResponse = parse(send(request, grant_type).await?, "token").await?;
        Ok(token.into())
    }
}

#[async_trait]
impl SessionSource for GoTrueAuthClient {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.current())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(refresh_token) = self.current().and_then(|s| s.refresh_token) else {
            return Ok(None);
        };
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.store(Some(session.clone()));
        Ok(Some(session))
    }
}

#[async_trait]
impl AuthClient for GoTrueAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        self.store(Some(session.clone()));
        let _ = self.events.send(AuthStateChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ProviderError> {
        let request = self.public_request(Method::POST, "/signup").json(&json!({
            "email": email,
            "password": password,
            "data": sign_up_metadata(),
        }));
        let body: serde_json::Value = parse(send(request, "sign up").await?, "sign up").await?;

        // With email confirmation on, the provider answers with a bare user.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ProviderError::Other(format!("parse sign up: {e}")))?;
            let session: Session = token.into();
            self.store(Some(session.clone()));
            let _ = self.events.send(AuthStateChange::signed_in(session.clone()));
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user: UserIdentity = serde_json::from_value(body)
            .map_err(|e| ProviderError::Other(format!("parse sign up: {e}")))?;
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Some(session) = self.current() {
            let request = self
                .public_request(Method::POST, "/logout")
                .bearer_auth(&session.access_token);
            if let Err(e) = send(request, "sign out").await {
                tracing::warn!(error = %e, "provider sign-out failed, clearing local session anyway");
            }
        }
        self.store(None);
        let _ = self.events.send(AuthStateChange::signed_out());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contacthub_auth::Role;

    #[test]
    fn debug_redacts_keys() {
        let config = GoTrueConfig {
            url: "https://project.supabase.co".to_string(),
            anon_key: "anon-secret".to_string(),
            service_role_key: "service-secret".to_string(),
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("project.supabase.co"));
        assert!(!rendered.contains("service-secret"));
        assert!(!rendered.contains("anon-secret"));
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let config = GoTrueConfig {
            url: "https://project.supabase.co/".to_string(),
            anon_key: String::new(),
            service_role_key: String::new(),
        };
        assert_eq!(
            config.endpoint("/admin/users"),
            "https://project.supabase.co/auth/v1/admin/users"
        );
    }

    #[test]
    fn provider_user_payload_parses() {
        let user: UserIdentity = serde_json::from_value(json!({
            "id": "0190f0c2-6b9e-7c3a-9a55-3f1f6c2d9e10",
            "email": "vp@example.com",
            "app_metadata": {"provider": "email", "providers": ["email"], "role": "vp", "is_approved": true},
            "user_metadata": {},
            "created_at": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(user.metadata.effective_role(), Role::Vp);
        assert!(user.metadata.extra.contains_key("providers"));
        assert!(user.user_metadata.is_empty());
    }

    #[test]
    fn error_body_prefers_description() {
        let body: ErrorBody = serde_json::from_value(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        }))
        .unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid login credentials"));
    }
}
