//! Administrative endpoints for user management.
//!
//! Every handler validates its input, then resolves the bearer token against
//! the identity provider and checks the predicate itself. Nothing upstream is
//! trusted, since these endpoints can be called directly.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::Extension,
    http::HeaderMap,
    routing::{get, post},
};
use serde_json::Value;
use tracing::{error, info, warn};

use contacthub_auth::{MetadataUpdate, Requirement, UserMetadata, authorize, is_approved};
use contacthub_infra::OperationOptions;

use crate::app::dto::{
    ApprovalFix, DeleteUserRequest, FixApprovalResponse, SuccessResponse, UpdateUserRoleRequest,
    UserSummary, UsersResponse,
};
use crate::app::errors::{AdminError, ErrorOnly};
use crate::app::services::AppServices;
use crate::context::{CallerContext, request_id};
use crate::middleware::resolve_caller;

const DB_FAILURE: &str = "Database operation failed";

pub fn router() -> Router {
    Router::new()
        .route("/update-user-role", post(update_user_role))
        .route("/delete-user", post(delete_user))
        .route("/fix-user-approval", post(fix_user_approval))
        .route("/users", get(list_users))
}

/// Resolve the caller and require an approved VP.
async fn require_vp(
    services: &AppServices,
    headers: &HeaderMap,
    rid: &str,
) -> Result<CallerContext, AdminError> {
    let caller = resolve_caller(services.identity.as_ref(), headers)
        .await
        .inspect_err(|e| warn!(request_id = rid, error = %e, "authentication failed"))?;

    if authorize(caller.predicate(), Requirement::Vp).is_err() {
        warn!(
            request_id = rid,
            user_id = %caller.user_id(),
            role = ?caller.user().metadata.role,
            approved = caller.predicate().is_approved,
            "access denied: VP privileges required"
        );
        return Err(AdminError::vp_required());
    }
    Ok(caller)
}

/// POST /update-user-role
pub async fn update_user_role(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Json<SuccessResponse>, AdminError> {
    let rid = request_id();
    let started = Instant::now();
    info!(request_id = %rid, "update user role requested");

    let request = UpdateUserRoleRequest::parse(body.as_ref().map(|Json(v)| v))
        .inspect_err(|e| warn!(request_id = %rid, error = %e, "request validation failed"))?;
    let caller = require_vp(&services, &headers, &rid).await?;
    let target_id = request.target_user_id;

    let target = match services.identity.get_user_by_id(target_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(request_id = %rid, target_user_id = %target_id, "target user not found");
            return Err(AdminError::NotFound("Target user not found"));
        }
        Err(e) => {
            error!(request_id = %rid, target_user_id = %target_id, error = %e, "target lookup failed");
            return Err(AdminError::Operation("Failed to update user: Database operation failed"));
        }
    };

    let merged = target.metadata.merged(&request.update);
    info!(
        request_id = %rid,
        user_id = %caller.user_id(),
        target_user_id = %target_id,
        from_role = ?target.metadata.role,
        to_role = ?merged.role,
        from_approved = ?target.metadata.is_approved,
        to_approved = ?merged.is_approved,
        "updating user metadata"
    );

    if let Err(e) = services.identity.update_user_metadata(target_id, merged).await {
        error!(request_id = %rid, target_user_id = %target_id, error = %e, "metadata update failed");
        return Err(AdminError::Operation("Failed to update user: Database operation failed"));
    }

    info!(request_id = %rid, elapsed_ms = started.elapsed().as_millis() as u64, "user updated");
    Ok(Json(SuccessResponse::with_message("User updated successfully")))
}

/// POST /delete-user
///
/// Owned contacts go first; if that fails the identity record is left alone.
/// The profile row is best effort.
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Json<SuccessResponse>, AdminError> {
    let rid = request_id();
    let started = Instant::now();
    info!(request_id = %rid, "delete user requested");

    let request = DeleteUserRequest::parse(body.as_ref().map(|Json(v)| v))
        .inspect_err(|e| warn!(request_id = %rid, error = %e, "request validation failed"))?;
    let caller = require_vp(&services, &headers, &rid).await?;
    let target_id = request.target_user_id;

    if caller.user_id() == target_id {
        warn!(request_id = %rid, user_id = %caller.user_id(), "attempted self-deletion");
        return Err(AdminError::SelfDeletion);
    }

    match services.identity.get_user_by_id(target_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(request_id = %rid, target_user_id = %target_id, "target user not found");
            return Err(AdminError::NotFound("Target user not found"));
        }
        Err(e) => {
            error!(request_id = %rid, target_user_id = %target_id, error = %e, "target lookup failed");
            return Err(AdminError::Operation("Failed to delete user: Database operation failed"));
        }
    }

    let options = OperationOptions::default()
        .retry(services.admin_retry)
        .without_loading()
        .silent();

    let removed = services
        .executor
        .execute("Delete User Contacts", &options, || {
            services.contact_store.delete_by_owner(target_id)
        })
        .await
        .map_err(|e| {
            error!(request_id = %rid, target_user_id = %target_id, error = %e, "contact cleanup failed; identity left intact");
            AdminError::Operation("Failed to delete user: Database operation failed")
        })?;
    info!(request_id = %rid, target_user_id = %target_id, removed, "owned contacts removed");

    if let Err(e) = services
        .executor
        .execute("Delete User Profile", &options, || {
            services.profiles.delete_by_user(target_id)
        })
        .await
    {
        warn!(request_id = %rid, target_user_id = %target_id, error = %e, "profile cleanup failed; continuing");
    }

    if let Err(e) = services.identity.delete_user(target_id).await {
        error!(request_id = %rid, target_user_id = %target_id, error = %e, "identity deletion failed");
        return Err(AdminError::Operation("Failed to delete user: Database operation failed"));
    }

    info!(
        request_id = %rid,
        user_id = %caller.user_id(),
        target_user_id = %target_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "user deleted"
    );
    Ok(Json(SuccessResponse::ok()))
}

/// Whether an account has a real role but a missing or false approval flag.
fn needs_approval_fix(metadata: &UserMetadata) -> bool {
    is_approved(metadata) && !metadata.approved_flag()
}

/// POST /fix-user-approval
///
/// Marks every user with an assigned role as explicitly approved. Per-user
/// failures are reported in `updates` and do not stop the sweep.
pub async fn fix_user_approval(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Result<Json<FixApprovalResponse>, AdminError> {
    let rid = request_id();
    let started = Instant::now();
    info!(request_id = %rid, "approval fix requested");

    require_vp(&services, &headers, &rid).await?;

    let users = services.identity.list_users().await.map_err(|e| {
        error!(request_id = %rid, error = %e, "listing users failed");
        AdminError::Operation("Failed to fetch users")
    })?;

    let approve = MetadataUpdate {
        role: None,
        is_approved: Some(true),
    };
    let mut updates = Vec::new();
    for user in users.into_iter().filter(|u| needs_approval_fix(&u.metadata)) {
        let role = user.metadata.role.clone();
        let merged = user.metadata.merged(&approve);
        match services.identity.update_user_metadata(user.id, merged).await {
            Ok(_) => {
                info!(request_id = %rid, target_user_id = %user.id, role = ?role, "approval fixed");
                updates.push(ApprovalFix {
                    user_id: user.id,
                    success: true,
                    role,
                    error: None,
                });
            }
            Err(e) => {
                error!(request_id = %rid, target_user_id = %user.id, error = %e, "approval fix failed");
                updates.push(ApprovalFix {
                    user_id: user.id,
                    success: false,
                    role: None,
                    error: Some(DB_FAILURE.to_string()),
                });
            }
        }
    }

    let updated = updates.iter().filter(|u| u.success).count();
    info!(
        request_id = %rid,
        updated,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "approval fix completed"
    );
    Ok(Json(FixApprovalResponse {
        success: true,
        message: format!("Updated {updated} users"),
        updates,
    }))
}

/// GET /users: users with an email, newest first.
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Result<Json<UsersResponse>, ErrorOnly> {
    let rid = request_id();
    let started = Instant::now();

    require_vp(&services, &headers, &rid).await?;

    let users = services.identity.list_users().await.map_err(|e| {
        error!(request_id = %rid, error = %e, "listing users failed");
        AdminError::Operation("Failed to fetch users from database")
    })?;

    let mut users: Vec<UserSummary> = users
        .into_iter()
        .filter_map(UserSummary::from_identity)
        .collect();
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    info!(
        request_id = %rid,
        count = users.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "users listed"
    );
    Ok(Json(UsersResponse { users }))
}
