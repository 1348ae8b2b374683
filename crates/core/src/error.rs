//! Error taxonomy shared by every layer.
//!
//! Layer-specific errors (`ProviderError`, `StoreError`, ...) convert into
//! [`AppError`], the normalized form handed to callers and the retry wrapper.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Classification of a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or invalid session / token.
    AuthenticationError,
    /// Valid identity, insufficient role or approval.
    AuthorizationError,
    /// Malformed request body or field.
    ValidationError,
    /// Transport failure.
    NetworkError,
    /// Upstream 5xx.
    ServerError,
    /// Upstream 429.
    RateLimitError,
    /// Target record or user absent.
    NotFound,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorCode::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Map an upstream HTTP status to a code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::AuthenticationError,
            403 => ErrorCode::AuthorizationError,
            400 | 422 => ErrorCode::ValidationError,
            404 => ErrorCode::NotFound,
            // Request timeout is a transport failure; 504 falls in with the 5xx.
            408 => ErrorCode::NetworkError,
            429 => ErrorCode::RateLimitError,
            500..=599 => ErrorCode::ServerError,
            _ => ErrorCode::UnknownError,
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized application error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    /// Offending field for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Upstream HTTP status, when the failure came from one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            status: None,
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationError, msg)
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthorizationError, msg)
    }

    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(ErrorCode::ValidationError, msg)
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnknownError, msg)
    }

    /// Build from an upstream HTTP status and its message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut err = Self::new(ErrorCode::from_status(status), readable_message(&message));
        err.status = Some(status);
        err
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether a retry may succeed: network failures, 5xx, 429 and timeouts.
    pub fn is_retryable(&self) -> bool {
        if let Some(status) = self.status {
            if (500..600).contains(&status) || status == 429 {
                return true;
            }
        }

        match self.code {
            ErrorCode::NetworkError
            | ErrorCode::ServerError
            | ErrorCode::RateLimitError => true,
            _ => self.message.to_lowercase().contains("timeout"),
        }
    }
}

const READABLE_MESSAGES: &[(&str, &str)] = &[
    (
        "Invalid login credentials",
        "Invalid email or password. Please check your credentials and try again.",
    ),
    (
        "Email not confirmed",
        "Please check your email and click the confirmation link before signing in.",
    ),
    ("User not found", "No account found with this email address."),
    (
        "Password should be at least 6 characters",
        "Password must be at least 6 characters long.",
    ),
    (
        "duplicate key value violates unique constraint",
        "This email address is already registered.",
    ),
    (
        "new row violates row-level security policy",
        "You do not have permission to perform this action.",
    ),
    (
        "permission denied",
        "You do not have permission to access this resource.",
    ),
    (
        "Failed to fetch",
        "Unable to connect to the server. Please check your internet connection.",
    ),
    ("NetworkError", "Network connection failed. Please try again."),
    (
        "invalid input syntax",
        "Invalid data format. Please check your input and try again.",
    ),
    (
        "value too long",
        "One or more fields exceed the maximum length allowed.",
    ),
];

/// Translate a technical upstream message into user-facing text.
///
/// Exact matches win over substring matches; unknown messages pass through.
pub fn readable_message(message: &str) -> String {
    if let Some((_, readable)) = READABLE_MESSAGES.iter().find(|(raw, _)| *raw == message) {
        return (*readable).to_string();
    }

    let lowered = message.to_lowercase();
    READABLE_MESSAGES
        .iter()
        .find(|(raw, _)| lowered.contains(&raw.to_lowercase()))
        .map(|(_, readable)| (*readable).to_string())
        .unwrap_or_else(|| message.to_string())
}
