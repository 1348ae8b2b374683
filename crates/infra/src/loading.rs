//! Loading indicators keyed by operation.
//!
//! A [`LoadingGuard`] marks its key as loading until it is dropped, so the
//! flag is cleared on success, failure and cancellation alike.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

pub const DEFAULT_LOADING_KEY: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadingState {
    pub message: Option<String>,
    /// Number of live guards for the key.
    pub active: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LoadingTracker {
    states: Arc<Mutex<HashMap<String, LoadingState>>>,
}

impl LoadingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` (or the default key) as loading until the guard drops.
    pub fn start(&self, key: Option<&str>, message: Option<String>) -> LoadingGuard {
        let key = key.unwrap_or(DEFAULT_LOADING_KEY).to_string();
        if let Ok(mut states) = self.states.lock() {
            let state = states.entry(key.clone()).or_insert(LoadingState {
                message: None,
                active: 0,
            });
            state.active += 1;
            if message.is_some() {
                state.message = message;
            }
        }
        LoadingGuard {
            tracker: self.clone(),
            key,
        }
    }

    pub fn is_loading(&self, key: Option<&str>) -> bool {
        self.state(key).is_some()
    }

    pub fn any_loading(&self) -> bool {
        self.states.lock().map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn state(&self, key: Option<&str>) -> Option<LoadingState> {
        let key = key.unwrap_or(DEFAULT_LOADING_KEY);
        self.states.lock().ok()?.get(key).cloned()
    }

    fn finish(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            let done = match states.get_mut(key) {
                Some(state) => {
                    state.active = state.active.saturating_sub(1);
                    state.active == 0
                }
                None => false,
            };
            if done {
                states.remove(key);
            }
        }
    }
}

#[must_use = "loading ends when the guard is dropped"]
pub struct LoadingGuard {
    tracker: LoadingTracker,
    key: String,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tracker.finish(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_clears_on_drop() {
        let tracker = LoadingTracker::new();
        {
            let _guard = tracker.start(None, Some("Loading contacts...".to_string()));
            assert!(tracker.is_loading(None));
            assert_eq!(
                tracker.state(None).unwrap().message.as_deref(),
                Some("Loading contacts...")
            );
        }
        assert!(!tracker.is_loading(None));
        assert!(!tracker.any_loading());
    }

    #[test]
    fn nested_guards_share_a_key() {
        let tracker = LoadingTracker::new();
        let outer = tracker.start(Some("users"), None);
        let inner = tracker.start(Some("users"), None);
        drop(inner);
        assert!(tracker.is_loading(Some("users")));
        drop(outer);
        assert!(!tracker.is_loading(Some("users")));
    }
}
