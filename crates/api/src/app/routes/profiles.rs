//! Profile endpoints.
//!
//! Own profile is always readable; other profiles need an approved officer
//! or VP. Creating a profile for someone else is VP-only.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::HeaderMap,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use contacthub_core::UserId;
use contacthub_infra::store::StoreError;

use crate::app::dto::{CreateUserProfileRequest, ProfileResponse, SuccessResponse};
use crate::app::errors::{AdminError, ErrorOnly};
use crate::app::services::AppServices;
use crate::context::request_id;
use crate::middleware::resolve_caller;

pub fn router() -> Router {
    Router::new()
        .route("/user-profile/:user_id", get(get_user_profile))
        .route("/create-user-profile", post(create_user_profile))
}

/// GET /user-profile/:user_id
pub async fn get_user_profile(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<ProfileResponse>, ErrorOnly> {
    let rid = request_id();
    let started = Instant::now();

    let user_id: UserId = user_id
        .trim()
        .parse()
        .map_err(|_| AdminError::validation("User ID must be a valid UUID"))?;

    let caller = resolve_caller(services.identity.as_ref(), &headers)
        .await
        .inspect_err(|e| warn!(request_id = %rid, error = %e, "authentication failed"))
        .map_err(AdminError::from)?;

    if caller.user_id() != user_id && !caller.predicate().is_officer_or_vp() {
        warn!(
            request_id = %rid,
            user_id = %caller.user_id(),
            target_user_id = %user_id,
            "insufficient permissions to read profile"
        );
        return Err(AdminError::Forbidden("Insufficient permissions").into());
    }

    let profile = services
        .profiles
        .get_by_user(user_id)
        .await
        .map_err(|e| {
            error!(request_id = %rid, target_user_id = %user_id, error = %e, "profile lookup failed");
            AdminError::Operation("Failed to fetch user profile")
        })?
        .ok_or(AdminError::NotFound("User profile not found"))?;

    info!(
        request_id = %rid,
        target_user_id = %user_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "profile fetched"
    );
    Ok(Json(ProfileResponse { profile }))
}

/// POST /create-user-profile
pub async fn create_user_profile(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Json<SuccessResponse>, AdminError> {
    let rid = request_id();
    info!(request_id = %rid, "create user profile requested");

    let profile = CreateUserProfileRequest::parse(body.as_ref().map(|Json(v)| v))
        .and_then(CreateUserProfileRequest::into_new_profile)
        .inspect_err(|e| warn!(request_id = %rid, error = %e, "request validation failed"))?;

    let caller = resolve_caller(services.identity.as_ref(), &headers)
        .await
        .inspect_err(|e| warn!(request_id = %rid, error = %e, "authentication failed"))?;
    if caller.user_id() != profile.user_id && !caller.predicate().is_vp {
        warn!(
            request_id = %rid,
            user_id = %caller.user_id(),
            target_user_id = %profile.user_id,
            "profile creation for another user denied"
        );
        return Err(AdminError::vp_required());
    }

    let target = profile.user_id;
    match services.profiles.insert(profile.into_profile(Utc::now())).await {
        Ok(_) => {
            info!(request_id = %rid, target_user_id = %target, "profile created");
            Ok(Json(SuccessResponse::ok()))
        }
        Err(StoreError::Conflict(msg)) => {
            warn!(request_id = %rid, target_user_id = %target, error = %msg, "profile already exists");
            Err(AdminError::validation("User profile already exists"))
        }
        Err(e) => {
            error!(request_id = %rid, target_user_id = %target, error = %e, "profile insert failed");
            Err(AdminError::Operation("Failed to create user profile"))
        }
    }
}
