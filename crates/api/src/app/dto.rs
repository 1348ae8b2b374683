//! Request parsing and response shapes for the HTTP endpoints.
//!
//! Admin bodies are read as raw JSON so every shape problem can be reported
//! together instead of failing on the first one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use contacthub_auth::roles::VALID_ROLES;
use contacthub_auth::{AuthzPredicate, MetadataUpdate, Role, UserIdentity, UserState};
use contacthub_core::{NewUserProfile, UserId, UserProfile};

use crate::app::errors::AdminError;

fn valid_roles_list() -> String {
    VALID_ROLES
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Body of `POST /update-user-role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserRoleRequest {
    pub target_user_id: UserId,
    pub update: MetadataUpdate,
}

/// Body of `POST /delete-user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteUserRequest {
    pub target_user_id: UserId,
}

fn require_object(body: Option<&Value>) -> Result<&serde_json::Map<String, Value>, AdminError> {
    body.and_then(Value::as_object)
        .ok_or_else(|| AdminError::validation("Request body is required"))
}

fn target_user_id(body: &serde_json::Map<String, Value>, errors: &mut Vec<String>) -> Option<UserId> {
    match body.get("targetUserId") {
        Some(Value::String(s)) if !s.trim().is_empty() => match s.trim().parse::<UserId>() {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push("Target user ID must be a valid UUID".to_string());
                None
            }
        },
        _ => {
            errors.push("Target user ID is required and must be a string".to_string());
            None
        }
    }
}

impl UpdateUserRoleRequest {
    pub fn parse(body: Option<&Value>) -> Result<Self, AdminError> {
        let body = require_object(body)?;
        let mut errors = Vec::new();

        let target = target_user_id(body, &mut errors);

        let role = match body.get("newRole") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match s.parse::<Role>() {
                Ok(role) => Some(role),
                Err(_) => {
                    errors.push(format!("New role must be one of: {}", valid_roles_list()));
                    None
                }
            },
            Some(_) => {
                errors.push(format!("New role must be one of: {}", valid_roles_list()));
                None
            }
        };
        let role_given = !matches!(body.get("newRole"), None | Some(Value::Null));

        let is_approved = match body.get("isApproved") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                errors.push("isApproved must be a boolean value".to_string());
                None
            }
        };
        let approval_given = !matches!(body.get("isApproved"), None | Some(Value::Null));

        if !role_given && !approval_given {
            errors.push("At least one field (newRole or isApproved) must be provided".to_string());
        }

        match target {
            Some(target_user_id) if errors.is_empty() => Ok(Self {
                target_user_id,
                update: MetadataUpdate { role, is_approved },
            }),
            _ => Err(AdminError::Validation(errors)),
        }
    }
}

impl DeleteUserRequest {
    pub fn parse(body: Option<&Value>) -> Result<Self, AdminError> {
        let body = require_object(body)?;
        let mut errors = Vec::new();
        match target_user_id(body, &mut errors) {
            Some(target_user_id) => Ok(Self { target_user_id }),
            None => Err(AdminError::Validation(errors)),
        }
    }
}

/// Body of `POST /create-user-profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateUserProfileRequest {
    pub user_id: Option<String>,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub user_position: Option<String>,
}

/// A string field: absent and null read as `None`, other types are reported.
fn string_field(
    body: &serde_json::Map<String, Value>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match body.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.push(format!("{key} must be a string"));
            None
        }
    }
}

impl CreateUserProfileRequest {
    pub fn parse(body: Option<&Value>) -> Result<Self, AdminError> {
        let body = require_object(body)?;
        let mut errors = Vec::new();

        let request = Self {
            user_id: string_field(body, "userId", &mut errors),
            full_name: string_field(body, "fullName", &mut errors),
            phone_number: string_field(body, "phoneNumber", &mut errors),
            user_position: string_field(body, "userPosition", &mut errors),
        };

        if errors.is_empty() {
            Ok(request)
        } else {
            Err(AdminError::Validation(errors))
        }
    }

    pub fn into_new_profile(self) -> Result<NewUserProfile, AdminError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !present(&self.user_id) || !present(&self.full_name) || !present(&self.phone_number) {
            return Err(AdminError::validation("Missing required fields"));
        }

        let user_id = self
            .user_id
            .as_deref()
            .unwrap_or_default()
            .trim()
            .parse::<UserId>()
            .map_err(|_| AdminError::validation("User ID must be a valid UUID"))?;

        NewUserProfile {
            user_id,
            full_name: self.full_name.unwrap_or_default(),
            phone_number: self.phone_number.unwrap_or_default(),
            user_position: self.user_position,
        }
        .normalized()
        .map_err(|e| AdminError::validation(e.message))
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

/// One row of the admin user list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub role: String,
    pub is_approved: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserSummary {
    /// `None` for users without an email.
    pub fn from_identity(user: UserIdentity) -> Option<Self> {
        let email = user.email.filter(|e| !e.is_empty())?;
        Some(Self {
            id: user.id,
            email,
            role: user
                .metadata
                .role
                .clone()
                .unwrap_or_else(|| Role::Member.as_str().to_string()),
            is_approved: user.metadata.approved_flag(),
            created_at: user.created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalFix {
    pub user_id: UserId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FixApprovalResponse {
    pub success: bool,
    pub message: String,
    pub updates: Vec<ApprovalFix>,
}

/// Server-side view of the caller's session, for client hydration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub state: UserState,
    pub predicate: AuthzPredicate,
    pub display_name: String,
    pub role_display_name: &'static str,
}

impl SessionResponse {
    pub fn from_state(state: UserState) -> Self {
        Self {
            predicate: state.predicate(),
            display_name: state.display_name(),
            role_display_name: state.role_display_name(),
            state,
        }
    }
}
