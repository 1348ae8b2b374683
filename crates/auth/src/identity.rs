//! User identities as the identity provider reports them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use contacthub_core::UserId;

use crate::Role;

const ROLE_KEY: &str = "role";
const APPROVED_KEY: &str = "is_approved";
const FULL_NAME_KEY: &str = "full_name";

/// The provider-managed metadata bag attached to a user.
///
/// Recognized keys are lifted into typed fields; everything else is kept in
/// `extra` so admin updates never drop keys this crate does not know about.
/// Values of the wrong JSON type are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct UserMetadata {
    /// Raw role value; may hold `"pending"` or values outside [`Role`].
    pub role: Option<String>,
    pub is_approved: Option<bool>,
    /// Cached display name; `user_profiles` is authoritative.
    pub full_name: Option<String>,
    pub extra: Map<String, Value>,
}

impl UserMetadata {
    pub fn new(role: Option<Role>, is_approved: Option<bool>) -> Self {
        Self {
            role: role.map(|r| r.as_str().to_string()),
            is_approved,
            ..Self::default()
        }
    }

    /// The role tier, `member` when absent or unrecognized.
    pub fn effective_role(&self) -> Role {
        self.role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or_default()
    }

    /// The explicit approval flag, `false` when absent.
    pub fn approved_flag(&self) -> bool {
        self.is_approved == Some(true)
    }

    /// Merge only the provided fields, keeping every other key.
    pub fn merged(&self, update: &MetadataUpdate) -> UserMetadata {
        let mut next = self.clone();
        if let Some(role) = update.role {
            next.role = Some(role.as_str().to_string());
        }
        if let Some(approved) = update.is_approved {
            next.is_approved = Some(approved);
        }
        next
    }
}

impl From<Map<String, Value>> for UserMetadata {
    fn from(mut map: Map<String, Value>) -> Self {
        let role = match map.remove(ROLE_KEY) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        let is_approved = map.remove(APPROVED_KEY).and_then(|v| v.as_bool());
        let full_name = match map.remove(FULL_NAME_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        };
        Self {
            role,
            is_approved,
            full_name,
            extra: map,
        }
    }
}

impl From<UserMetadata> for Map<String, Value> {
    fn from(meta: UserMetadata) -> Self {
        let mut map = meta.extra;
        if let Some(role) = meta.role {
            map.insert(ROLE_KEY.to_string(), Value::String(role));
        }
        if let Some(approved) = meta.is_approved {
            map.insert(APPROVED_KEY.to_string(), Value::Bool(approved));
        }
        if let Some(name) = meta.full_name {
            map.insert(FULL_NAME_KEY.to_string(), Value::String(name));
        }
        map
    }
}

/// Fields an administrator may change on a user's metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub role: Option<Role>,
    pub is_approved: Option<bool>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.is_approved.is_none()
    }
}

/// Self-service metadata attached at sign-up.
///
/// It is stored as `user_metadata`, which authorization never reads, so a
/// fresh account has no app role and stays pending until a VP approves it.
pub fn sign_up_metadata() -> Map<String, Value> {
    UserMetadata::new(Some(Role::Member), Some(false)).into()
}

/// A user identity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    /// Admin-managed metadata; the only bag the predicate reads.
    #[serde(default, rename = "app_metadata")]
    pub metadata: UserMetadata,
    /// User-writable metadata. Not trusted for authorization.
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserIdentity {
    pub fn new(id: UserId, email: impl Into<String>, metadata: UserMetadata) -> Self {
        Self {
            id,
            email: Some(email.into()),
            metadata,
            user_metadata: Map::new(),
            created_at: Some(Utc::now()),
        }
    }

    pub fn with_user_metadata(mut self, user_metadata: Map<String, Value>) -> Self {
        self.user_metadata = user_metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_keys_survive_round_trip() {
        let meta: UserMetadata = serde_json::from_value(json!({
            "role": "officer",
            "is_approved": false,
            "full_name": "Grace Hopper",
            "provider": "email",
            "providers": ["email"]
        }))
        .unwrap();

        assert_eq!(meta.role.as_deref(), Some("officer"));
        assert_eq!(meta.is_approved, Some(false));
        assert_eq!(meta.extra.len(), 2);

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["provider"], "email");
        assert_eq!(back["full_name"], "Grace Hopper");
    }

    #[test]
    fn wrong_types_are_absent() {
        let meta: UserMetadata = serde_json::from_value(json!({
            "role": 7,
            "is_approved": "true"
        }))
        .unwrap();
        assert_eq!(meta.role, None);
        assert_eq!(meta.is_approved, None);
        assert_eq!(meta.effective_role(), Role::Member);
        assert!(!meta.approved_flag());
    }

    #[test]
    fn merge_touches_only_given_fields() {
        let mut meta = UserMetadata::new(Some(Role::Officer), Some(false));
        meta.full_name = Some("Ada".to_string());
        meta.extra.insert("provider".into(), json!("email"));

        let merged = meta.merged(&MetadataUpdate {
            role: None,
            is_approved: Some(true),
        });

        assert_eq!(merged.role.as_deref(), Some("officer"));
        assert_eq!(merged.is_approved, Some(true));
        assert_eq!(merged.full_name.as_deref(), Some("Ada"));
        assert_eq!(merged.extra.get("provider"), Some(&json!("email")));
    }

    #[test]
    fn sign_up_seed_is_not_app_metadata() {
        let user = UserIdentity::new(UserId::new(), "new@example.com", UserMetadata::default())
            .with_user_metadata(sign_up_metadata());

        assert_eq!(user.user_metadata.get("role"), Some(&json!("member")));
        assert_eq!(user.metadata.role, None);
        assert!(!crate::is_approved(&user.metadata));

        let wire = serde_json::to_value(&user).unwrap();
        assert_eq!(wire["user_metadata"]["is_approved"], json!(false));
        assert!(wire["app_metadata"].get("role").is_none());
    }

    #[test]
    fn pending_role_is_member_tier() {
        let meta = UserMetadata {
            role: Some("pending".to_string()),
            ..UserMetadata::default()
        };
        assert_eq!(meta.effective_role(), Role::Member);
    }
}
