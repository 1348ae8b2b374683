use contacthub_auth::{AuthzPredicate, UserIdentity};
use contacthub_core::UserId;
use contacthub_infra::Actor;

/// Authenticated caller of a request, resolved from its bearer token.
///
/// The identity is the provider's current view, not the token's snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerContext {
    user: UserIdentity,
    predicate: AuthzPredicate,
}

impl CallerContext {
    pub fn new(user: UserIdentity) -> Self {
        let predicate = AuthzPredicate::evaluate(Some(&user));
        Self { user, predicate }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn predicate(&self) -> &AuthzPredicate {
        &self.predicate
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user.id,
            predicate: self.predicate,
        }
    }
}

/// Short id used to correlate the log lines of one request.
pub fn request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
