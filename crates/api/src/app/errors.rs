use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

use contacthub_auth::AuthzError;
use contacthub_core::{AppError, ErrorCode};

use crate::middleware::AuthFailure;

/// Failure of an administrative endpoint.
///
/// Messages are safe to return to the caller; internal details are logged at
/// the point of failure and never carried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Cannot delete your own account")]
    SelfDeletion,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Unavailable(&'static str),

    #[error("{0}")]
    Operation(&'static str),
}

impl AdminError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdminError::Validation(_) | AdminError::SelfDeletion => StatusCode::BAD_REQUEST,
            AdminError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AdminError::Forbidden(_) => StatusCode::FORBIDDEN,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AdminError::Operation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AdminError::Validation(vec![message.into()])
    }

    /// Shorthand for a VP-only denial.
    pub fn vp_required() -> Self {
        AdminError::Forbidden("Access denied: VP privileges required")
    }
}

impl From<AuthFailure> for AdminError {
    fn from(err: AuthFailure) -> Self {
        match err {
            AuthFailure::MissingToken => AdminError::Unauthenticated("Authentication required"),
            AuthFailure::InvalidToken => AdminError::Unauthenticated("Invalid authentication token"),
            AuthFailure::Provider(e) => {
                tracing::error!(error = %e, "identity provider unavailable during authentication");
                AdminError::Unavailable("Authentication service unavailable")
            }
        }
    }
}

impl From<AuthzError> for AdminError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => AdminError::Unauthenticated("Authentication required"),
            AuthzError::NotApproved => AdminError::Forbidden("Access denied: account not approved"),
            AuthzError::Forbidden(req) => AdminError::Forbidden(req.denial_message()),
        }
    }
}

/// `{success: false, error}` body used by the mutating endpoints.
impl IntoResponse for AdminError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        (
            status,
            axum::Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

/// `{error}` body used by the read endpoints.
#[derive(Debug)]
pub struct ErrorOnly(pub AdminError);

impl From<AdminError> for ErrorOnly {
    fn from(err: AdminError) -> Self {
        ErrorOnly(err)
    }
}

impl IntoResponse for ErrorOnly {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status();
        (status, axum::Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::AuthenticationError => StatusCode::UNAUTHORIZED,
        ErrorCode::AuthorizationError => StatusCode::FORBIDDEN,
        ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::NetworkError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::ServerError => StatusCode::BAD_GATEWAY,
        ErrorCode::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn app_error_to_response(err: AppError) -> axum::response::Response {
    let status = status_for(err.code);
    if status.is_server_error() {
        tracing::error!(code = %err.code, error = %err, "request failed");
        return json_error(status, err.code.as_str(), "Internal server error");
    }
    let mut body = json!({
        "error": err.code.as_str(),
        "message": err.message,
    });
    if let Some(field) = err.field {
        body["field"] = json!(field);
    }
    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
