//! Cached user state for one execution context (a server request or a client
//! session).
//!
//! `role` and `is_approved` are never written on their own: the only
//! mutators take a whole [`CachedUser`] (or clear everything), so they always
//! match the metadata of the cached user.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

use contacthub_core::UserId;

use crate::{AuthzPredicate, Role, UserIdentity, UserMetadata};

/// Essentials of a user identity kept in the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedUser {
    pub id: UserId,
    pub email: String,
    #[serde(rename = "app_metadata")]
    pub metadata: UserMetadata,
}

impl CachedUser {
    /// Copy the recognized metadata keys; unrelated keys stay with the provider.
    pub fn from_identity(user: &UserIdentity) -> Self {
        Self {
            id: user.id,
            email: user.email.clone().unwrap_or_default(),
            metadata: UserMetadata {
                role: user.metadata.role.clone(),
                is_approved: user.metadata.is_approved,
                full_name: user.metadata.full_name.clone(),
                extra: Default::default(),
            },
        }
    }

    pub fn with_full_name(mut self, full_name: Option<String>) -> Self {
        if full_name.is_some() {
            self.metadata.full_name = full_name;
        }
        self
    }
}

/// Snapshot of the cached state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserState {
    user: Option<CachedUser>,
    role: Role,
    is_approved: bool,
    loading: bool,
}

impl Default for UserState {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl UserState {
    pub fn signed_out() -> Self {
        Self {
            user: None,
            role: Role::Member,
            is_approved: false,
            loading: false,
        }
    }

    fn from_user(user: CachedUser, loading: bool) -> Self {
        Self {
            role: user.metadata.effective_role(),
            is_approved: user.metadata.approved_flag(),
            user: Some(user),
            loading,
        }
    }

    pub fn user(&self) -> Option<&CachedUser> {
        self.user.as_ref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The explicit approval flag as last synced (see [`Self::predicate`]
    /// for the effective approval).
    pub fn is_approved_flag(&self) -> bool {
        self.is_approved
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn predicate(&self) -> AuthzPredicate {
        AuthzPredicate::from_metadata(self.user.as_ref().map(|u| &u.metadata))
    }

    /// Full name, then email, then `Guest`.
    pub fn display_name(&self) -> String {
        match &self.user {
            Some(user) => user
                .metadata
                .full_name
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| Some(user.email.clone()).filter(|e| !e.is_empty()))
                .unwrap_or_else(|| "Guest".to_string()),
            None => "Guest".to_string(),
        }
    }

    pub fn role_display_name(&self) -> &'static str {
        self.role.display_name()
    }

    /// Same user, same recognized metadata.
    fn holds(&self, user: &CachedUser) -> bool {
        self.user.as_ref() == Some(user)
    }
}

/// Shared handle to one context's cached state.
#[derive(Debug, Clone, Default)]
pub struct UserStateCache {
    inner: Arc<RwLock<UserState>>,
}

impl UserStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UserState {
        match self.inner.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Overwrite with `user`. Returns `false` when nothing changed.
    pub fn apply_user(&self, user: CachedUser) -> bool {
        self.write(|state| {
            if state.holds(&user) {
                return false;
            }
            *state = UserState::from_user(user, state.loading);
            true
        })
    }

    /// Reset to the signed-out state. Returns `false` when already there.
    pub fn clear(&self) -> bool {
        self.write(|state| {
            let cleared = UserState::signed_out();
            if *state == cleared {
                return false;
            }
            *state = cleared;
            true
        })
    }

    pub fn set_loading(&self, loading: bool) {
        self.write(|state| state.loading = loading);
    }

    /// Turn `loading` on until the returned flag is dropped.
    pub fn begin_loading(&self) -> LoadingFlag {
        self.set_loading(true);
        LoadingFlag {
            cache: self.clone(),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut UserState) -> R) -> R {
        match self.inner.write() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

/// Clears the `loading` flag on drop, including when the owning future is
/// cancelled.
#[must_use = "loading is cleared as soon as the flag is dropped"]
#[derive(Debug)]
pub struct LoadingFlag {
    cache: UserStateCache,
}

impl Drop for LoadingFlag {
    fn drop(&mut self) {
        self.cache.set_loading(false);
    }
}

/// A cache that may be installed after the code that needs it has started.
///
/// Installation is one-shot and wakes every waiter.
#[derive(Debug, Clone, Default)]
pub struct CacheSlot {
    inner: Arc<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    cache: OnceLock<UserStateCache>,
    installed: Notify,
}

impl CacheSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ready(cache: UserStateCache) -> Self {
        let slot = Self::default();
        slot.install(cache);
        slot
    }

    /// Install the cache. Returns `false` if one was already installed.
    pub fn install(&self, cache: UserStateCache) -> bool {
        let installed = self.inner.cache.set(cache).is_ok();
        if installed {
            self.inner.installed.notify_waiters();
        }
        installed
    }

    pub fn get(&self) -> Option<UserStateCache> {
        self.inner.cache.get().cloned()
    }

    /// Wait for installation, at most `attempts` rounds of `delay` each.
    pub async fn wait(&self, attempts: u32, delay: Duration) -> Option<UserStateCache> {
        for _ in 0..attempts {
            let installed = self.inner.installed.notified();
            if let Some(cache) = self.get() {
                return Some(cache);
            }
            let _ = tokio::time::timeout(delay, installed).await;
        }
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Option<Role>, approved: Option<bool>) -> CachedUser {
        CachedUser {
            id: UserId::new(),
            email: "member@example.com".to_string(),
            metadata: UserMetadata::new(role, approved),
        }
    }

    #[test]
    fn role_and_flag_follow_metadata() {
        let cache = UserStateCache::new();
        assert!(cache.apply_user(user(Some(Role::Officer), Some(true))));

        let state = cache.snapshot();
        assert_eq!(state.role(), Role::Officer);
        assert!(state.is_approved_flag());
        assert!(state.predicate().can_edit_contacts);
    }

    #[test]
    fn missing_metadata_defaults_to_member_unapproved() {
        let cache = UserStateCache::new();
        cache.apply_user(user(None, None));

        let state = cache.snapshot();
        assert_eq!(state.role(), Role::Member);
        assert!(!state.is_approved_flag());
        assert!(!state.predicate().is_approved);
    }

    #[test]
    fn reapplying_same_user_is_a_no_op() {
        let cache = UserStateCache::new();
        let u = user(Some(Role::Vp), Some(true));
        assert!(cache.apply_user(u.clone()));
        let before = cache.snapshot();
        assert!(!cache.apply_user(u));
        assert_eq!(cache.snapshot(), before);
    }

    #[test]
    fn clear_resets_everything() {
        let cache = UserStateCache::new();
        cache.apply_user(user(Some(Role::Vp), Some(true)));
        cache.set_loading(true);

        assert!(cache.clear());
        assert_eq!(cache.snapshot(), UserState::signed_out());
        assert!(!cache.clear());
    }

    #[test]
    fn loading_flag_clears_on_drop() {
        let cache = UserStateCache::new();
        let flag = cache.begin_loading();
        assert!(cache.snapshot().loading());
        drop(flag);
        assert!(!cache.snapshot().loading());
    }

    #[test]
    fn display_name_falls_back() {
        let cache = UserStateCache::new();
        assert_eq!(cache.snapshot().display_name(), "Guest");

        let u = user(Some(Role::Vp), Some(true));
        cache.apply_user(u.clone());
        assert_eq!(cache.snapshot().display_name(), "member@example.com");

        cache.apply_user(u.with_full_name(Some("Grace Hopper".to_string())));
        assert_eq!(cache.snapshot().display_name(), "Grace Hopper");
        assert_eq!(cache.snapshot().role_display_name(), "Vice President");
    }

    #[tokio::test]
    async fn slot_wait_sees_late_install() {
        let slot = CacheSlot::empty();
        let installer = slot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            installer.install(UserStateCache::new());
        });

        let cache = slot.wait(5, Duration::from_millis(100)).await;
        assert!(cache.is_some());
    }

    #[tokio::test]
    async fn slot_wait_gives_up() {
        let slot = CacheSlot::empty();
        let cache = slot.wait(2, Duration::from_millis(5)).await;
        assert!(cache.is_none());
    }
}
