use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Permission tier of a user.
///
/// `Vp ⊇ Officer ⊇ Member` for editing contacts; deleting contacts and
/// administering users is VP-exclusive.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Officer,
    Vp,
}

/// Metadata role value marking an account that has not been assigned a tier.
pub const PENDING_ROLE: &str = "pending";

pub const VALID_ROLES: [Role; 3] = [Role::Member, Role::Officer, Role::Vp];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}' (expected one of: member, officer, vp)")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Officer => "officer",
            Role::Vp => "vp",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Member => "Member",
            Role::Officer => "Officer",
            Role::Vp => "Vice President",
        }
    }

    pub fn is_officer_or_vp(&self) -> bool {
        matches!(self, Role::Officer | Role::Vp)
    }
}

impl core::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "officer" => Ok(Role::Officer),
            "vp" => Ok(Role::Vp),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
