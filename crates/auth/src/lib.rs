//! `contacthub-auth`: identity, approval and route-guard logic.
//!
//! This crate is decoupled from HTTP and storage. Provider and profile access
//! go through the traits in [`provider`] and [`sync`].

pub mod claims;
pub mod guard;
pub mod identity;
pub mod predicate;
pub mod provider;
pub mod roles;
pub mod session;
pub mod state;
pub mod sync;

pub use claims::{ClaimsError, Hs256JwtValidator, JwtClaims, JwtValidator, validate_claims};
pub use guard::{
    Denial, EXEMPT_PATHS, GlobalGuard, GuardChain, GuardOutcome, GuardState, LOGIN_PATH,
    NavigationDecision, PENDING_APPROVAL_PATH, RoleGuard, RouteGuard,
};
pub use identity::{MetadataUpdate, UserIdentity, UserMetadata, sign_up_metadata};
pub use predicate::{AuthzError, AuthzPredicate, Requirement, authorize, is_approved};
pub use provider::{
    AuthClient, BearerSession, IdentityAdmin, ProviderError, SessionSource, SignUpOutcome,
};
pub use roles::{PENDING_ROLE, Role, UnknownRole};
pub use session::{AuthEvent, AuthStateChange, Session};
pub use state::{CacheSlot, CachedUser, LoadingFlag, UserState, UserStateCache};
pub use sync::{
    ProfileLookup, SYNC_MAX_ATTEMPTS, SYNC_RETRY_DELAY, SessionSynchronizer, SyncContext,
    SyncOutcome,
};
