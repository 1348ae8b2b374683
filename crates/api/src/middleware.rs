use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

use contacthub_auth::{BearerSession, GuardOutcome, IdentityAdmin, ProviderError};

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing or malformed authorization header")]
    MissingToken,

    #[error("invalid authentication token")]
    InvalidToken,

    #[error("identity provider unavailable: {0}")]
    Provider(ProviderError),
}

/// Resolve the request's bearer token to the provider's current identity.
///
/// Fails closed: a missing header, an unknown token or a provider outage all
/// yield an error.
pub async fn resolve_caller(
    identity: &dyn IdentityAdmin,
    headers: &HeaderMap,
) -> Result<CallerContext, AuthFailure> {
    let token = extract_bearer(headers).ok_or(AuthFailure::MissingToken)?;
    match identity.get_user(token).await {
        Ok(user) => Ok(CallerContext::new(user)),
        Err(e) if e.is_auth_failure() || e == ProviderError::UserNotFound => {
            Err(AuthFailure::InvalidToken)
        }
        Err(e) => Err(AuthFailure::Provider(e)),
    }
}

/// Authentication for the contact API: attaches a [`CallerContext`].
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match resolve_caller(services.identity.as_ref(), req.headers()).await {
        Ok(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(AuthFailure::Provider(e)) => {
            tracing::error!(error = %e, "identity provider unavailable during authentication");
            errors::json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "NETWORK_ERROR",
                "Authentication service unavailable",
            )
        }
        Err(e) => errors::json_error(StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR", e.to_string()),
    }
}

/// Navigation guard for page routes. Redirects become `303 See Other`,
/// role denials become `403`.
pub async fn page_guard(
    State(services): State<Arc<AppServices>>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let token = extract_bearer(req.headers()).map(str::to_string);
    let session = BearerSession::new(Arc::clone(&services.identity), token);

    let decision = services.guards.evaluate(&path, &session).await;
    match decision.outcome {
        GuardOutcome::Allowed => next.run(req).await,
        GuardOutcome::Redirect { to } => Redirect::to(to).into_response(),
        GuardOutcome::Denied(denial) => {
            let status = StatusCode::from_u16(denial.status).unwrap_or(StatusCode::FORBIDDEN);
            errors::json_error(status, "AUTHORIZATION_ERROR", denial.message)
        }
    }
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("Bearer   ")), None);
        assert_eq!(extract_bearer(&headers("Basic abc")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
