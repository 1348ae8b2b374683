use std::sync::Arc;

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode};

use contacthub_auth::{BearerSession, CacheSlot, SessionSynchronizer, SyncContext, UserStateCache};

use crate::app::{dto::SessionResponse, services::AppServices};
use crate::middleware::extract_bearer;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /session: one server-side sync pass for this request's token,
/// including the display-name lookup.
///
/// The cache is built per request, so nothing leaks between callers. A
/// missing or invalid token yields the signed-out state, not an error.
pub async fn session(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Json<SessionResponse> {
    let token = extract_bearer(&headers).map(str::to_string);
    let source = Arc::new(BearerSession::new(Arc::clone(&services.identity), token));
    let cache = UserStateCache::new();

    let sync = SessionSynchronizer::new(source, CacheSlot::ready(cache.clone()), SyncContext::Server)
        .with_profiles(services.profile_lookup());
    let synced = sync.refresh_user_session().await;
    tracing::debug!(synced, "server session sync");

    Json(SessionResponse::from_state(cache.snapshot()))
}
