//! Execution wrapper for data operations: retry with exponential backoff,
//! loading indication and failure notices, all returning [`AppError`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use contacthub_auth::SessionSource;
use contacthub_core::{AppError, ErrorCode};

use crate::loading::LoadingTracker;
use crate::notifications::{Notification, Notifier, TracingNotifier};

/// Retry policy for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Per-call switches.
#[derive(Debug, Clone)]
pub struct OperationOptions {
    pub retry: RetryPolicy,
    pub show_loading: bool,
    pub loading_key: Option<String>,
    pub loading_message: Option<String>,
    pub notify_failure: bool,
    pub success: Option<(String, String)>,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            show_loading: true,
            loading_key: None,
            loading_message: None,
            notify_failure: true,
            success: None,
        }
    }
}

impl OperationOptions {
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn no_retry(self) -> Self {
        self.retry(RetryPolicy::no_retry())
    }

    pub fn loading(mut self, key: Option<&str>, message: impl Into<String>) -> Self {
        self.show_loading = true;
        self.loading_key = key.map(str::to_string);
        self.loading_message = Some(message.into());
        self
    }

    pub fn without_loading(mut self) -> Self {
        self.show_loading = false;
        self
    }

    pub fn silent(mut self) -> Self {
        self.notify_failure = false;
        self
    }

    pub fn on_success(mut self, title: impl Into<String>, message: impl Into<String>) -> Self {
        self.success = Some((title.into(), message.into()));
        self
    }
}

pub struct OperationExecutor {
    loading: LoadingTracker,
    notifier: Arc<dyn Notifier>,
}

impl Default for OperationExecutor {
    fn default() -> Self {
        Self::new(LoadingTracker::new(), Arc::new(TracingNotifier))
    }
}

impl OperationExecutor {
    pub fn new(loading: LoadingTracker, notifier: Arc<dyn Notifier>) -> Self {
        Self { loading, notifier }
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.loading
    }

    /// Run `operation`, retrying retryable failures per `options.retry`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        context: &str,
        options: &OperationOptions,
        mut operation: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<AppError>,
    {
        let _loading = options.show_loading.then(|| {
            self.loading
                .start(options.loading_key.as_deref(), options.loading_message.clone())
        });

        let policy = options.retry;
        let mut attempt = 1;
        let result = loop {
            match operation().await {
                Ok(value) => break Ok(value),
                Err(e) => {
                    let err: AppError = e.into();
                    if attempt >= policy.max_attempts || !err.is_retryable() {
                        break Err(err);
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(context, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying operation");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        match &result {
            Ok(_) => {
                if let Some((title, message)) = &options.success {
                    self.notifier
                        .notify(Notification::success(title.clone(), message.clone()));
                }
            }
            Err(err) => {
                warn!(context, attempts = attempt, code = %err.code, error = %err, "operation failed");
                if options.notify_failure {
                    self.notifier.notify(Notification::failure(context, err));
                }
            }
        }
        result
    }
}

/// Call an authenticated API with the current access token. On an
/// authentication failure, refresh the session once and retry with the new
/// token.
pub async fn with_session_retry<S, T, F, Fut>(source: &S, mut call: F) -> Result<T, AppError>
where
    S: SessionSource + ?Sized,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let token = source
        .get_session()
        .await?
        .map(|s| s.access_token)
        .ok_or_else(|| AppError::authentication("Authentication token not available"))?;

    match call(token).await {
        Err(err) if err.code == ErrorCode::AuthenticationError => {
            let refreshed = match source.refresh_session().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "session refresh after authentication failure failed");
                    None
                }
            };
            match refreshed {
                Some(session) => call(session.access_token).await,
                None => Err(err),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{NotificationLevel, NotificationLog};
    use async_trait::async_trait;
    use contacthub_auth::{ProviderError, Session, UserIdentity, UserMetadata};
    use contacthub_core::UserId;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor() -> (OperationExecutor, Arc<NotificationLog>) {
        let log = Arc::new(NotificationLog::new());
        (OperationExecutor::new(LoadingTracker::new(), log.clone()), log)
    }

    fn fast() -> OperationOptions {
        OperationOptions::default().retry(RetryPolicy::default().with_base_delay(Duration::from_millis(1)))
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_retryable_until_success() {
        let (exec, log) = executor();
        let calls = AtomicU32::new(0);

        let result = exec
            .execute("Fetch Contacts", &fast().on_success("Done", "ok"), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(AppError::from_status(503, "unavailable"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(log.entries()[0].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (exec, log) = executor();
        let calls = AtomicU32::new(0);

        let err = exec
            .execute("Fetch Contacts", &fast(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::network("connection reset")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.code, ErrorCode::NetworkError);
        assert_eq!(log.entries()[0].level, NotificationLevel::Warning);
    }

    #[tokio::test]
    async fn non_retryable_fails_once_and_clears_loading() {
        let (exec, log) = executor();
        let calls = AtomicU32::new(0);
        let options = fast().loading(Some("contacts"), "Loading contacts...");

        let err = exec
            .execute("Add Contact", &options, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::validation("email", "Invalid email")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(!exec.loading().is_loading(Some("contacts")));
        assert_eq!(log.entries()[0].level, NotificationLevel::Error);
        assert_eq!(log.entries()[0].title, "Add Contact Failed");
    }

    #[tokio::test]
    async fn silent_skips_notices() {
        let (exec, log) = executor();
        let _ = exec
            .execute("Sign Out", &fast().no_retry().silent(), || async {
                Err::<(), _>(AppError::unknown("boom"))
            })
            .await;
        assert!(log.entries().is_empty());
    }

    struct Tokens {
        current: Mutex<Option<String>>,
        next: Option<String>,
    }

    fn session(token: String) -> Session {
        Session {
            access_token: token,
            refresh_token: None,
            expires_at: None,
            user: UserIdentity::new(UserId::new(), "u@example.com", UserMetadata::default()),
        }
    }

    #[async_trait]
    impl SessionSource for Tokens {
        async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
            Ok(self.current.lock().unwrap().clone().map(session))
        }

        async fn refresh_session(&self) -> Result<Option<Session>, ProviderError> {
            *self.current.lock().unwrap() = self.next.clone();
            Ok(self.next.clone().map(session))
        }
    }

    #[tokio::test]
    async fn auth_failure_refreshes_once() {
        let source = Tokens {
            current: Mutex::new(Some("stale".to_string())),
            next: Some("fresh".to_string()),
        };
        let seen = Mutex::new(Vec::new());

        let result = with_session_retry(&source, |token| {
            seen.lock().unwrap().push(token.clone());
            async move {
                if token == "fresh" {
                    Ok("users")
                } else {
                    Err(AppError::authentication("Authentication failed"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "users");
        assert_eq!(*seen.lock().unwrap(), vec!["stale", "fresh"]);
    }

    #[tokio::test]
    async fn missing_token_is_authentication_error() {
        let source = Tokens {
            current: Mutex::new(None),
            next: None,
        };
        let err = with_session_retry(&source, |_| async { Ok::<_, AppError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthenticationError);
    }
}
