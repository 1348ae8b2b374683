use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use contacthub_core::UserId;

use crate::{UserIdentity, UserMetadata};

/// Access-token claims (the subset of a provider session token this crate reads).
///
/// Metadata is copied into the token at issue time, so a token carries a
/// snapshot that goes stale when an administrator changes the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub app_metadata: UserMetadata,

    /// Issued-at (seconds since epoch).
    pub iat: i64,

    /// Expiration (seconds since epoch).
    pub exp: i64,
}

impl JwtClaims {
    pub fn for_identity(user: &UserIdentity, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user.id,
            email: user.email.clone(),
            app_metadata: user.metadata.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Deterministically validate the time window of a token's claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), ClaimsError> {
    if claims.exp <= claims.iat {
        return Err(ClaimsError::InvalidTimeWindow);
    }
    if now.timestamp() < claims.iat {
        return Err(ClaimsError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}

/// Decodes and verifies access tokens.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, ClaimsError>;
}

/// Shared-secret (HS256) token codec.
pub struct Hs256JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn sign(&self, claims: &JwtClaims) -> Result<String, ClaimsError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ClaimsError::Malformed(e.to_string()))
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, ClaimsError> {
        // Time checks are done against the caller's clock in `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| ClaimsError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        let user = UserIdentity::new(
            UserId::new(),
            "vp@example.com",
            UserMetadata::new(Some(Role::Vp), Some(true)),
        );
        JwtClaims::for_identity(&user, now, Duration::minutes(10))
    }

    #[test]
    fn sign_then_validate() {
        let codec = Hs256JwtValidator::new("test-secret");
        let now = Utc::now();
        let c = claims(now);
        let token = codec.sign(&c).unwrap();

        let decoded = codec.validate(&token, now).unwrap();
        assert_eq!(decoded.sub, c.sub);
        assert_eq!(decoded.app_metadata.effective_role(), Role::Vp);
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let now = Utc::now();
        let token = Hs256JwtValidator::new("a").sign(&claims(now)).unwrap();
        let err = Hs256JwtValidator::new("b").validate(&token, now).unwrap_err();
        assert!(matches!(err, ClaimsError::Malformed(_)));
    }

    #[test]
    fn expired_token_rejected() {
        let now = Utc::now();
        let codec = Hs256JwtValidator::new("s");
        let token = codec.sign(&claims(now)).unwrap();
        let later = now + Duration::minutes(11);
        assert_eq!(codec.validate(&token, later).unwrap_err(), ClaimsError::Expired);
    }

    #[test]
    fn inverted_window_rejected() {
        let now = Utc::now();
        let mut c = claims(now);
        c.exp = c.iat;
        assert_eq!(validate_claims(&c, now), Err(ClaimsError::InvalidTimeWindow));
    }
}
