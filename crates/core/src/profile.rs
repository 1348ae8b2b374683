//! User profile rows (`user_profiles`): the source of truth for display names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contact::check_phone;
use crate::error::{AppError, AppResult};
use crate::id::{ProfileId, UserId};

pub const DEFAULT_POSITION: &str = "Member";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub user_position: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a profile row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserProfile {
    pub user_id: UserId,
    pub full_name: String,
    pub phone_number: String,
    pub user_position: Option<String>,
}

impl NewUserProfile {
    /// Validate and normalize (trimmed name, defaulted position).
    pub fn normalized(self) -> AppResult<NewUserProfile> {
        let full_name = self.full_name.trim().to_string();
        if full_name.chars().count() < 2 {
            return Err(AppError::validation(
                "fullName",
                "Full name must be at least 2 characters",
            ));
        }
        if self.phone_number.trim().is_empty() {
            return Err(AppError::validation("phoneNumber", "Phone number is required"));
        }
        check_phone(&self.phone_number)?;

        let user_position = self
            .user_position
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_POSITION.to_string());

        Ok(NewUserProfile {
            user_id: self.user_id,
            full_name,
            phone_number: self.phone_number.trim().to_string(),
            user_position: Some(user_position),
        })
    }

    pub fn into_profile(self, now: DateTime<Utc>) -> UserProfile {
        UserProfile {
            id: ProfileId::new(),
            user_id: self.user_id,
            full_name: self.full_name,
            phone_number: Some(self.phone_number),
            user_position: self
                .user_position
                .unwrap_or_else(|| DEFAULT_POSITION.to_string()),
            created_at: now,
        }
    }
}
