//! Keeps a context's [`UserStateCache`] in line with the provider session.
//!
//! Every write re-reads the live session right before touching the cache;
//! a session obtained before an await is never written.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use contacthub_core::{AppError, UserId};

use crate::state::{CacheSlot, CachedUser, UserStateCache};
use crate::{AuthEvent, AuthStateChange, SessionSource};

pub const SYNC_MAX_ATTEMPTS: u32 = 5;
pub const SYNC_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of display names when the metadata has none.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn full_name(&self, user_id: UserId) -> Result<Option<String>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncContext {
    Server,
    Client,
}

impl SyncContext {
    fn as_str(&self) -> &'static str {
        match self {
            SyncContext::Server => "server",
            SyncContext::Client => "client",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    Unchanged,
    Cleared,
    /// The cache never became ready within the wait bound.
    CacheUnavailable,
}

pub struct SessionSynchronizer {
    source: Arc<dyn SessionSource>,
    slot: CacheSlot,
    profiles: Option<Arc<dyn ProfileLookup>>,
    context: SyncContext,
    wait_attempts: u32,
    wait_delay: Duration,
}

impl SessionSynchronizer {
    pub fn new(source: Arc<dyn SessionSource>, slot: CacheSlot, context: SyncContext) -> Self {
        Self {
            source,
            slot,
            profiles: None,
            context,
            wait_attempts: SYNC_MAX_ATTEMPTS,
            wait_delay: SYNC_RETRY_DELAY,
        }
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileLookup>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_wait(mut self, attempts: u32, delay: Duration) -> Self {
        self.wait_attempts = attempts;
        self.wait_delay = delay;
        self
    }

    pub fn slot(&self) -> &CacheSlot {
        &self.slot
    }

    /// Startup pass: adopt the live session user when the cache disagrees.
    /// Without a live session the cache is cleared, since the session may
    /// have ended without a `SIGNED_OUT` reaching this context.
    pub async fn initialize(&self) -> SyncOutcome {
        let Some(cache) = self.cache().await else {
            return SyncOutcome::CacheUnavailable;
        };

        match self.source.get_session().await {
            Ok(Some(session)) => self.write_user(&cache, CachedUser::from_identity(&session.user)),
            Ok(None) => self.clear(&cache),
            Err(e) => {
                tracing::warn!(context = self.context.as_str(), error = %e, "session lookup failed during initialization");
                self.clear(&cache)
            }
        }
    }

    pub async fn handle_event(&self, change: &AuthStateChange) -> SyncOutcome {
        let Some(cache) = self.cache().await else {
            return SyncOutcome::CacheUnavailable;
        };

        match change.event {
            AuthEvent::SignedOut => self.clear(&cache),
            AuthEvent::SignedIn => self.sync_user_store(&cache, false).await,
        }
    }

    /// Force a reissued session, then sync with display-name enrichment.
    /// Failures are logged and reported as `false`.
    pub async fn refresh_user_session(&self) -> bool {
        let Some(cache) = self.cache().await else {
            tracing::warn!(context = self.context.as_str(), "user state cache not ready, skipping refresh");
            return false;
        };

        let _loading = cache.begin_loading();
        match self.source.refresh_session().await {
            Ok(Some(_)) => !matches!(
                self.sync_user_store(&cache, true).await,
                SyncOutcome::Cleared | SyncOutcome::CacheUnavailable
            ),
            Ok(None) => {
                tracing::info!(context = self.context.as_str(), "no session to refresh");
                false
            }
            Err(e) => {
                tracing::warn!(context = self.context.as_str(), error = %e, "session refresh failed");
                false
            }
        }
    }

    /// Listen for auth-state changes until the sender goes away.
    pub fn spawn_listener(self: Arc<Self>, mut rx: broadcast::Receiver<AuthStateChange>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        self.handle_event(&change).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "auth events lagged, resyncing from live session");
                        if let Some(cache) = self.cache().await {
                            self.sync_user_store(&cache, false).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn cache(&self) -> Option<UserStateCache> {
        let cache = self.slot.wait(self.wait_attempts, self.wait_delay).await;
        if cache.is_none() {
            tracing::warn!(
                context = self.context.as_str(),
                attempts = self.wait_attempts,
                "user state cache was not initialized in time"
            );
        }
        cache
    }

    async fn sync_user_store(&self, cache: &UserStateCache, enrich: bool) -> SyncOutcome {
        let session = match self.source.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return self.clear(cache),
            Err(e) => {
                tracing::warn!(context = self.context.as_str(), error = %e, "session lookup failed, treating as signed out");
                return self.clear(cache);
            }
        };

        let mut user = CachedUser::from_identity(&session.user);
        if enrich && user.metadata.full_name.is_none() {
            let full_name = self.lookup_full_name(user.id).await;
            user = user.with_full_name(full_name);
        }
        self.write_user(cache, user)
    }

    async fn lookup_full_name(&self, user_id: UserId) -> Option<String> {
        let profiles = self.profiles.as_ref()?;
        match profiles.full_name(user_id).await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "profile lookup failed");
                None
            }
        }
    }

    fn write_user(&self, cache: &UserStateCache, user: CachedUser) -> SyncOutcome {
        // A name found by an earlier enrichment is kept while the metadata has none.
        let user = match cache.snapshot().user() {
            Some(prev) if prev.id == user.id && user.metadata.full_name.is_none() => {
                let name = prev.metadata.full_name.clone();
                user.with_full_name(name)
            }
            _ => user,
        };

        let user_id = user.id;
        if cache.apply_user(user) {
            tracing::debug!(context = self.context.as_str(), user_id = %user_id, "user state updated from session");
            SyncOutcome::Updated
        } else {
            SyncOutcome::Unchanged
        }
    }

    fn clear(&self, cache: &UserStateCache) -> SyncOutcome {
        cache.clear();
        SyncOutcome::Cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderError, Role, Session, UserIdentity, UserMetadata};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeSource {
        session: Mutex<Option<Session>>,
        fail: Mutex<bool>,
        refreshes: AtomicUsize,
    }

    impl FakeSource {
        fn set_user(&self, user: Option<UserIdentity>) {
            *self.session.lock().unwrap() = user.map(|user| Session {
                access_token: "token".to_string(),
                refresh_token: None,
                expires_at: None,
                user,
            });
        }
    }

    #[async_trait]
    impl SessionSource for FakeSource {
        async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
            if *self.fail.lock().unwrap() {
                return Err(ProviderError::Network("down".to_string()));
            }
            Ok(self.session.lock().unwrap().clone())
        }

        async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.get_session().await
        }
    }

    struct Names;

    #[async_trait]
    impl ProfileLookup for Names {
        async fn full_name(&self, _user_id: UserId) -> Result<Option<String>, AppError> {
            Ok(Some("Katherine Johnson".to_string()))
        }
    }

    fn identity(role: Option<Role>, approved: Option<bool>) -> UserIdentity {
        UserIdentity::new(UserId::new(), "user@example.com", UserMetadata::new(role, approved))
    }

    fn setup() -> (Arc<FakeSource>, UserStateCache, SessionSynchronizer) {
        let source = Arc::new(FakeSource::default());
        let cache = UserStateCache::new();
        let sync = SessionSynchronizer::new(source.clone(), CacheSlot::ready(cache.clone()), SyncContext::Client)
            .with_wait(2, Duration::from_millis(5));
        (source, cache, sync)
    }

    #[tokio::test]
    async fn initialize_adopts_live_session() {
        let (source, cache, sync) = setup();
        source.set_user(Some(identity(Some(Role::Officer), None)));

        assert_eq!(sync.initialize().await, SyncOutcome::Updated);
        let state = cache.snapshot();
        assert_eq!(state.role(), Role::Officer);
        assert!(!state.is_approved_flag());
        assert!(state.predicate().is_approved);
    }

    #[tokio::test]
    async fn repeated_sync_is_idempotent() {
        let (source, cache, sync) = setup();
        source.set_user(Some(identity(Some(Role::Vp), Some(true))));

        sync.initialize().await;
        let first = cache.snapshot();
        assert_eq!(sync.initialize().await, SyncOutcome::Unchanged);
        assert_eq!(cache.snapshot(), first);
    }

    #[tokio::test]
    async fn signed_in_rereads_live_session() {
        let (source, cache, sync) = setup();
        let stale = identity(Some(Role::Member), Some(false));
        let live = UserIdentity {
            metadata: UserMetadata::new(Some(Role::Vp), Some(true)),
            ..stale.clone()
        };
        source.set_user(Some(live));

        let event = AuthStateChange::signed_in(Session {
            access_token: "old".to_string(),
            refresh_token: None,
            expires_at: None,
            user: stale,
        });
        sync.handle_event(&event).await;

        assert_eq!(cache.snapshot().role(), Role::Vp);
    }

    #[tokio::test]
    async fn signed_out_clears() {
        let (source, cache, sync) = setup();
        source.set_user(Some(identity(Some(Role::Vp), Some(true))));
        sync.initialize().await;

        assert_eq!(sync.handle_event(&AuthStateChange::signed_out()).await, SyncOutcome::Cleared);
        let state = cache.snapshot();
        assert!(state.user().is_none());
        assert_eq!(state.role(), Role::Member);
        assert!(!state.is_approved_flag());
        assert!(!state.loading());
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_signed_out() {
        let (source, cache, sync) = setup();
        source.set_user(Some(identity(Some(Role::Vp), Some(true))));
        sync.initialize().await;

        *source.fail.lock().unwrap() = true;
        let event = AuthStateChange::signed_in(source.session.lock().unwrap().clone().unwrap());
        sync.handle_event(&event).await;
        assert!(cache.snapshot().user().is_none());
    }

    #[tokio::test]
    async fn refresh_enriches_display_name() {
        let (source, cache, sync) = setup();
        let sync = sync.with_profiles(Arc::new(Names));
        source.set_user(Some(identity(Some(Role::Member), Some(true))));

        assert!(sync.refresh_user_session().await);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.snapshot().display_name(), "Katherine Johnson");
        assert!(!cache.snapshot().loading());

        // A plain sync afterwards keeps the enriched name.
        assert_eq!(sync.initialize().await, SyncOutcome::Unchanged);
        assert_eq!(cache.snapshot().display_name(), "Katherine Johnson");
    }

    #[tokio::test]
    async fn refresh_failure_returns_false() {
        let (source, _cache, sync) = setup();
        *source.fail.lock().unwrap() = true;
        assert!(!sync.refresh_user_session().await);

        *source.fail.lock().unwrap() = false;
        assert!(!sync.refresh_user_session().await);
    }

    #[tokio::test]
    async fn missing_cache_is_bounded_no_op() {
        let source = Arc::new(FakeSource::default());
        source.set_user(Some(identity(Some(Role::Vp), Some(true))));
        let sync = SessionSynchronizer::new(source, CacheSlot::empty(), SyncContext::Server)
            .with_wait(3, Duration::from_millis(5));

        assert_eq!(sync.initialize().await, SyncOutcome::CacheUnavailable);
        assert!(!sync.refresh_user_session().await);
    }

    #[tokio::test]
    async fn ended_session_clears_on_next_initialize() {
        let (source, cache, sync) = setup();
        source.set_user(Some(identity(Some(Role::Vp), Some(true))));
        sync.initialize().await;
        assert!(cache.snapshot().predicate().is_vp);

        // Session gone with no SIGNED_OUT delivered.
        source.set_user(None);
        assert_eq!(sync.initialize().await, SyncOutcome::Cleared);
        let state = cache.snapshot();
        assert!(state.user().is_none());
        assert!(!state.predicate().is_vp);
    }

    struct Stalled;

    #[async_trait]
    impl SessionSource for Stalled {
        async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
            Ok(None)
        }

        async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancelled_refresh_resets_loading() {
        let cache = UserStateCache::new();
        let sync = SessionSynchronizer::new(
            Arc::new(Stalled),
            CacheSlot::ready(cache.clone()),
            SyncContext::Client,
        );

        let refresh = sync.refresh_user_session();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), refresh).await;
        assert!(timed_out.is_err());
        assert!(!cache.snapshot().loading());
    }

    #[tokio::test]
    async fn listener_applies_events_until_closed() {
        let (source, cache, sync) = setup();
        source.set_user(Some(identity(Some(Role::Officer), Some(true))));
        let (tx, rx) = broadcast::channel(4);

        let handle = Arc::new(sync).spawn_listener(rx);
        let session = source.session.lock().unwrap().clone().unwrap();
        tx.send(AuthStateChange::signed_in(session)).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(cache.snapshot().role(), Role::Officer);
    }
}
