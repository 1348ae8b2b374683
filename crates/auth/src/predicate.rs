//! The authorization predicate.
//!
//! This is the only place the approval policy is written down. Route guards,
//! the cached user state and the admin endpoints all call into it.
//!
//! - No IO
//! - No panics
//! - Same answer on server and client for the same snapshot

use serde::Serialize;
use thiserror::Error;

use contacthub_core::AppError;

use crate::roles::PENDING_ROLE;
use crate::{Role, UserIdentity, UserMetadata};

/// Everything derived from a user snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthzPredicate {
    pub is_authenticated: bool,
    pub is_approved: bool,
    pub role: Role,
    #[serde(rename = "isVP")]
    pub is_vp: bool,
    pub can_edit_contacts: bool,
    pub can_delete_contacts: bool,
}

/// Approval: the explicit flag, or any assigned role other than `pending`.
pub fn is_approved(metadata: &UserMetadata) -> bool {
    let has_role = metadata
        .role
        .as_deref()
        .is_some_and(|role| role != PENDING_ROLE);
    metadata.approved_flag() || has_role
}

impl AuthzPredicate {
    pub fn evaluate(user: Option<&UserIdentity>) -> Self {
        Self::from_metadata(user.map(|u| &u.metadata))
    }

    pub fn from_metadata(metadata: Option<&UserMetadata>) -> Self {
        let Some(metadata) = metadata else {
            return Self::anonymous();
        };

        let is_approved = is_approved(metadata);
        let role = metadata.effective_role();
        let is_vp = is_approved && role == Role::Vp;

        Self {
            is_authenticated: true,
            is_approved,
            role,
            is_vp,
            can_edit_contacts: is_approved && role.is_officer_or_vp(),
            can_delete_contacts: is_vp,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            is_approved: false,
            role: Role::Member,
            is_vp: false,
            can_edit_contacts: false,
            can_delete_contacts: false,
        }
    }

    pub fn is_officer_or_vp(&self) -> bool {
        self.is_approved && self.role.is_officer_or_vp()
    }

    pub fn satisfies(&self, requirement: Requirement) -> bool {
        authorize(self, requirement).is_ok()
    }
}

/// What an operation or route demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Authenticated,
    Approved,
    OfficerOrVp,
    Vp,
    EditContacts,
    DeleteContacts,
}

impl Requirement {
    pub fn denial_message(&self) -> &'static str {
        match self {
            Requirement::Authenticated => "Authentication required",
            Requirement::Approved => "Account approval required",
            Requirement::OfficerOrVp => "Access denied. Officer or VP role required.",
            Requirement::Vp => "Access Denied: VP privileges required",
            Requirement::EditContacts => "Edit permissions required",
            Requirement::DeleteContacts => "Delete permissions required",
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("account approval required")]
    NotApproved,

    #[error("forbidden: {}", .0.denial_message())]
    Forbidden(Requirement),
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => AppError::authentication(err.to_string()),
            AuthzError::NotApproved => AppError::authorization(err.to_string()),
            AuthzError::Forbidden(req) => AppError::authorization(req.denial_message()),
        }
    }
}

/// Check a requirement: authentication first, then approval, then role.
pub fn authorize(predicate: &AuthzPredicate, required: Requirement) -> Result<(), AuthzError> {
    if !predicate.is_authenticated {
        return Err(AuthzError::Unauthenticated);
    }
    if required == Requirement::Authenticated {
        return Ok(());
    }
    if !predicate.is_approved {
        return Err(AuthzError::NotApproved);
    }

    let granted = match required {
        Requirement::Authenticated | Requirement::Approved => true,
        Requirement::OfficerOrVp => predicate.is_officer_or_vp(),
        Requirement::Vp => predicate.is_vp,
        Requirement::EditContacts => predicate.can_edit_contacts,
        Requirement::DeleteContacts => predicate.can_delete_contacts,
    };

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn meta(role: Option<&str>, approved: Option<bool>) -> UserMetadata {
        UserMetadata {
            role: role.map(str::to_string),
            is_approved: approved,
            ..UserMetadata::default()
        }
    }

    fn role_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("member".to_string())),
            Just(Some("officer".to_string())),
            Just(Some("vp".to_string())),
            Just(Some("pending".to_string())),
            "[a-z]{1,8}".prop_map(Some),
        ]
    }

    proptest! {
        #[test]
        fn approval_is_flag_or_non_pending_role(
            role in role_strategy(),
            approved in proptest::option::of(any::<bool>()),
        ) {
            let m = UserMetadata { role: role.clone(), is_approved: approved, ..UserMetadata::default() };
            let p = AuthzPredicate::from_metadata(Some(&m));
            let expected = approved == Some(true)
                || role.as_deref().is_some_and(|r| r != "pending");
            prop_assert_eq!(p.is_approved, expected);
        }

        #[test]
        fn delete_implies_vp_implies_approved_vp(
            role in role_strategy(),
            approved in proptest::option::of(any::<bool>()),
        ) {
            let m = UserMetadata { role, is_approved: approved, ..UserMetadata::default() };
            let p = AuthzPredicate::from_metadata(Some(&m));
            if p.can_delete_contacts {
                prop_assert!(p.is_vp);
            }
            if p.is_vp {
                prop_assert!(p.is_approved && p.role == Role::Vp);
            }
            if p.can_edit_contacts {
                prop_assert!(p.is_approved && p.role.is_officer_or_vp());
            }
        }
    }

    #[test]
    fn anonymous_has_nothing() {
        let p = AuthzPredicate::evaluate(None);
        assert_eq!(p, AuthzPredicate::anonymous());
        assert_eq!(authorize(&p, Requirement::Authenticated), Err(AuthzError::Unauthenticated));
    }

    #[test]
    fn missing_role_and_flag_is_unapproved_member() {
        let p = AuthzPredicate::from_metadata(Some(&meta(None, None)));
        assert!(p.is_authenticated);
        assert!(!p.is_approved);
        assert_eq!(p.role, Role::Member);
        assert_eq!(authorize(&p, Requirement::Approved), Err(AuthzError::NotApproved));
    }

    #[test]
    fn unapproved_officer_is_approved_by_role_but_not_vp() {
        let p = AuthzPredicate::from_metadata(Some(&meta(Some("officer"), Some(false))));
        assert!(p.is_approved);
        assert!(p.can_edit_contacts);
        assert!(!p.can_delete_contacts);
        assert_eq!(
            authorize(&p, Requirement::Vp),
            Err(AuthzError::Forbidden(Requirement::Vp))
        );
        assert!(authorize(&p, Requirement::OfficerOrVp).is_ok());
    }

    #[test]
    fn pending_role_needs_explicit_flag() {
        let pending = AuthzPredicate::from_metadata(Some(&meta(Some("pending"), None)));
        assert!(!pending.is_approved);

        let flagged = AuthzPredicate::from_metadata(Some(&meta(Some("pending"), Some(true))));
        assert!(flagged.is_approved);
        assert_eq!(flagged.role, Role::Member);
        assert!(!flagged.can_edit_contacts);
    }

    #[test]
    fn approved_vp_can_do_everything() {
        let p = AuthzPredicate::from_metadata(Some(&meta(Some("vp"), Some(true))));
        for req in [
            Requirement::Authenticated,
            Requirement::Approved,
            Requirement::OfficerOrVp,
            Requirement::Vp,
            Requirement::EditContacts,
            Requirement::DeleteContacts,
        ] {
            assert!(p.satisfies(req), "{req:?}");
        }
    }

    #[test]
    fn serializes_with_client_field_names() {
        let p = AuthzPredicate::from_metadata(Some(&meta(Some("vp"), Some(true))));
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["isVP"], true);
        assert_eq!(json["canDeleteContacts"], true);
        assert_eq!(json["role"], "vp");
    }
}
