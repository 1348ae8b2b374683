//! In-memory identity provider for tests and local development.
//!
//! Tokens are HS256 JWTs carrying the metadata as it was at issue time, so a
//! client session goes stale after an admin change until it is refreshed.
//! Admin lookups by token always return the current stored identity.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use contacthub_auth::{
    AuthClient, AuthStateChange, Hs256JwtValidator, IdentityAdmin, JwtClaims, JwtValidator,
    ProviderError, Session, SessionSource, SignUpOutcome, UserIdentity, UserMetadata,
    sign_up_metadata,
};
use contacthub_core::UserId;

const EVENT_CAPACITY: usize = 16;
const MIN_PASSWORD_LEN: usize = 6;

/// Provider operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityOp {
    GetUser,
    UpdateMetadata,
    DeleteUser,
    ListUsers,
    Refresh,
}

#[derive(Debug, Clone)]
struct StoredUser {
    identity: UserIdentity,
    password: String,
}

pub struct InMemoryIdentityProvider {
    users: RwLock<HashMap<UserId, StoredUser>>,
    refresh_tokens: RwLock<HashMap<String, UserId>>,
    codec: Hs256JwtValidator,
    token_ttl: Duration,
    failing: Mutex<HashSet<IdentityOp>>,
    delete_calls: AtomicUsize,
}

impl InMemoryIdentityProvider {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            refresh_tokens: RwLock::new(HashMap::new()),
            codec: Hs256JwtValidator::new(secret),
            token_ttl: Duration::hours(1),
            failing: Mutex::new(HashSet::new()),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Create a user directly, bypassing sign-up.
    pub fn seed_user(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> Result<UserIdentity, ProviderError> {
        self.insert_user(UserIdentity::new(UserId::new(), email, metadata), password)
    }

    fn insert_user(
        &self,
        identity: UserIdentity,
        password: &str,
    ) -> Result<UserIdentity, ProviderError> {
        let mut users = self.write_users()?;
        if users
            .values()
            .any(|u| u.identity.email.is_some() && u.identity.email == identity.email)
        {
            return Err(ProviderError::InvalidCredentials(
                "User already registered".to_string(),
            ));
        }

        users.insert(
            identity.id,
            StoredUser {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        Ok(identity)
    }

    /// Issue a fresh session for an existing user.
    pub fn issue_session(&self, id: UserId) -> Result<Session, ProviderError> {
        let identity = self
            .read_users()?
            .get(&id)
            .map(|u| u.identity.clone())
            .ok_or(ProviderError::UserNotFound)?;

        let now = Utc::now();
        let claims = JwtClaims::for_identity(&identity, now, self.token_ttl);
        let access_token = self
            .codec
            .sign(&claims)
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        let refresh_token = Uuid::new_v4().to_string();
        self.refresh_tokens
            .write()
            .map_err(|_| ProviderError::Other("refresh token lock poisoned".to_string()))?
            .insert(refresh_token.clone(), id);

        Ok(Session {
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: claims.expires_at(),
            user: identity,
        })
    }

    pub fn issue_token(&self, id: UserId) -> Result<String, ProviderError> {
        Ok(self.issue_session(id)?.access_token)
    }

    /// A client bound to this provider, with its own session and event channel.
    pub fn client(self: &Arc<Self>) -> InMemoryAuthClient {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        InMemoryAuthClient {
            provider: Arc::clone(self),
            current: RwLock::new(None),
            events,
        }
    }

    pub fn fail_on(&self, op: IdentityOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    pub fn recover(&self, op: IdentityOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&op);
        }
    }

    /// How many times `delete_user` was called, failed or not.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check(&self, op: IdentityOp) -> Result<(), ProviderError> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&op))
            .unwrap_or(false);
        if failing {
            return Err(ProviderError::Upstream {
                status: 503,
                message: format!("injected failure for {op:?}"),
            });
        }
        Ok(())
    }

    fn read_users(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<UserId, StoredUser>>, ProviderError> {
        self.users
            .read()
            .map_err(|_| ProviderError::Other("user table lock poisoned".to_string()))
    }

    fn write_users(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<UserId, StoredUser>>, ProviderError> {
        self.users
            .write()
            .map_err(|_| ProviderError::Other("user table lock poisoned".to_string()))
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let id = self
            .read_users()?
            .values()
            .find(|u| u.identity.email.as_deref() == Some(email) && u.password == password)
            .map(|u| u.identity.id)
            .ok_or_else(|| ProviderError::InvalidCredentials("Invalid login credentials".to_string()))?;
        self.issue_session(id)
    }

    fn refresh(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.check(IdentityOp::Refresh)?;
        let id = self
            .refresh_tokens
            .write()
            .map_err(|_| ProviderError::Other("refresh token lock poisoned".to_string()))?
            .remove(refresh_token)
            .ok_or(ProviderError::InvalidToken)?;
        self.issue_session(id)
    }

    fn revoke(&self, refresh_token: &str) {
        if let Ok(mut tokens) = self.refresh_tokens.write() {
            tokens.remove(refresh_token);
        }
    }
}

#[async_trait]
impl IdentityAdmin for InMemoryIdentityProvider {
    async fn get_user(&self, access_token: &str) -> Result<UserIdentity, ProviderError> {
        self.check(IdentityOp::GetUser)?;
        let claims = self
            .codec
            .validate(access_token, Utc::now())
            .map_err(|_| ProviderError::InvalidToken)?;

        self.read_users()?
            .get(&claims.sub)
            .map(|u| u.identity.clone())
            .ok_or(ProviderError::UserNotFound)
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<UserIdentity>, ProviderError> {
        self.check(IdentityOp::GetUser)?;
        Ok(self.read_users()?.get(&id).map(|u| u.identity.clone()))
    }

    async fn update_user_metadata(
        &self,
        id: UserId,
        metadata: UserMetadata,
    ) -> Result<UserIdentity, ProviderError> {
        self.check(IdentityOp::UpdateMetadata)?;
        let mut users = self.write_users()?;
        let user = users.get_mut(&id).ok_or(ProviderError::UserNotFound)?;
        user.identity.metadata = metadata;
        Ok(user.identity.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check(IdentityOp::DeleteUser)?;
        self.write_users()?
            .remove(&id)
            .map(|_| ())
            .ok_or(ProviderError::UserNotFound)
    }

    async fn list_users(&self) -> Result<Vec<UserIdentity>, ProviderError> {
        self.check(IdentityOp::ListUsers)?;
        Ok(self
            .read_users()?
            .values()
            .map(|u| u.identity.clone())
            .collect())
    }
}

/// End-user client: holds one session and broadcasts auth-state changes.
pub struct InMemoryAuthClient {
    provider: Arc<InMemoryIdentityProvider>,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl InMemoryAuthClient {
    fn store(&self, session: Option<Session>) {
        if let Ok(mut current) = self.current.write() {
            *current = session;
        }
    }

    fn emit(&self, change: AuthStateChange) {
        // No subscribers is fine.
        let _ = self.events.send(change);
    }
}

#[async_trait]
impl SessionSource for InMemoryAuthClient {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        self.current
            .read()
            .map(|s| s.clone())
            .map_err(|_| ProviderError::Other("session lock poisoned".to_string()))
    }

    async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(refresh_token) = self
            .get_session()
            .await?
            .and_then(|s| s.refresh_token)
        else {
            return Ok(None);
        };

        let session = self.provider.refresh(&refresh_token)?;
        self.store(Some(session.clone()));
        Ok(Some(session))
    }
}

#[async_trait]
impl AuthClient for InMemoryAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let session = self.provider.sign_in_with_password(email, password)?;
        self.store(Some(session.clone()));
        self.emit(AuthStateChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ProviderError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ProviderError::InvalidCredentials(
                "Password should be at least 6 characters".to_string(),
            ));
        }

        let user = self.provider.insert_user(
            UserIdentity::new(UserId::new(), email, UserMetadata::default())
                .with_user_metadata(sign_up_metadata()),
            password,
        )?;
        let session = self.provider.issue_session(user.id)?;
        self.store(Some(session.clone()));
        self.emit(AuthStateChange::signed_in(session.clone()));

        Ok(SignUpOutcome {
            user,
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Some(refresh_token) = self.get_session().await?.and_then(|s| s.refresh_token) {
            self.provider.revoke(&refresh_token);
        }
        self.store(None);
        self.emit(AuthStateChange::signed_out());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contacthub_auth::{
        AuthEvent, BearerSession, GuardChain, GuardOutcome, MetadataUpdate, PENDING_APPROVAL_PATH,
        Role,
    };

    fn provider() -> Arc<InMemoryIdentityProvider> {
        Arc::new(InMemoryIdentityProvider::new("test-secret"))
    }

    #[tokio::test]
    async fn sign_up_leaves_new_user_pending() {
        let provider = provider();
        let client = provider.client();
        let mut events = client.subscribe();

        let outcome = client.sign_up("new@example.com", "hunter22").await.unwrap();
        assert_eq!(outcome.user.metadata.role, None);
        assert_eq!(outcome.user.metadata.is_approved, None);
        assert_eq!(outcome.user.user_metadata.get("role"), Some(&serde_json::json!("member")));
        assert_eq!(events.recv().await.unwrap().event, AuthEvent::SignedIn);

        let token = outcome.session.unwrap().access_token;
        let decision = GuardChain::standard()
            .evaluate("/contacts", &BearerSession::new(provider.clone(), Some(token)))
            .await;
        assert_eq!(
            decision.outcome,
            GuardOutcome::Redirect {
                to: PENDING_APPROVAL_PATH
            }
        );
    }

    #[tokio::test]
    async fn short_password_rejected() {
        let client = provider().client();
        let err = client.sign_up("a@example.com", "123").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn session_is_stale_until_refreshed() {
        let provider = provider();
        let user = provider
            .seed_user("m@example.com", "password1", UserMetadata::new(Some(Role::Member), Some(true)))
            .unwrap();
        let client = provider.client();
        client.sign_in("m@example.com", "password1").await.unwrap();

        let promoted = user.metadata.merged(&MetadataUpdate {
            role: Some(Role::Officer),
            is_approved: None,
        });
        provider.update_user_metadata(user.id, promoted).await.unwrap();

        let stale = client.get_session().await.unwrap().unwrap();
        assert_eq!(stale.user.metadata.effective_role(), Role::Member);

        let fresh = client.refresh_session().await.unwrap().unwrap();
        assert_eq!(fresh.user.metadata.effective_role(), Role::Officer);

        // Token lookups always see the stored identity.
        let via_token = provider.get_user(&stale.access_token).await.unwrap();
        assert_eq!(via_token.metadata.effective_role(), Role::Officer);
    }

    #[tokio::test]
    async fn sign_out_clears_and_emits() {
        let provider = provider();
        provider
            .seed_user("v@example.com", "password1", UserMetadata::new(Some(Role::Vp), Some(true)))
            .unwrap();
        let client = provider.client();
        client.sign_in("v@example.com", "password1").await.unwrap();
        let mut events = client.subscribe();

        client.sign_out().await.unwrap();
        assert!(client.get_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().event, AuthEvent::SignedOut);
        assert!(client.refresh_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let err = provider().get_user("not-a-jwt").await.unwrap_err();
        assert_eq!(err, ProviderError::InvalidToken);
    }

    #[tokio::test]
    async fn delete_calls_are_counted_even_on_failure() {
        let provider = provider();
        provider.fail_on(IdentityOp::DeleteUser);
        assert!(provider.delete_user(UserId::new()).await.is_err());
        assert_eq!(provider.delete_calls(), 1);
    }
}
