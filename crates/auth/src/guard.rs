//! Route guards evaluated before a page is rendered.
//!
//! A navigation walks `Unchecked -> AuthenticatedChecked -> ApprovedChecked
//! -> RoleChecked` and ends allowed, redirected or denied. Missing identity
//! or approval redirects; a role mismatch on an elevated route is a 403
//! denial instead.

use std::sync::Arc;

use serde::Serialize;

use crate::{AuthzPredicate, Requirement, Session, SessionSource};

pub const LOGIN_PATH: &str = "/login";
pub const PENDING_APPROVAL_PATH: &str = "/pending-approval";

/// Pages that skip every guard.
pub const EXEMPT_PATHS: &[&str] = &["/login", "/signup", "/confirm", "/pending-approval", "/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Unchecked,
    AuthenticatedChecked,
    ApprovedChecked,
    RoleChecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub status: u16,
    pub message: &'static str,
    pub requirement: Requirement,
}

impl Denial {
    pub fn forbidden(requirement: Requirement) -> Self {
        Self {
            status: 403,
            message: requirement.denial_message(),
            requirement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    Allowed,
    Redirect { to: &'static str },
    Denied(Denial),
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allowed)
    }
}

/// Result of walking the chain for one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationDecision {
    pub outcome: GuardOutcome,
    /// Last state reached before the outcome.
    pub state: GuardState,
}

impl NavigationDecision {
    fn allowed(state: GuardState) -> Self {
        Self {
            outcome: GuardOutcome::Allowed,
            state,
        }
    }
}

pub trait RouteGuard: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, predicate: &AuthzPredicate) -> NavigationDecision;
}

/// Authentication and approval checks shared by every guard.
fn check_identity(predicate: &AuthzPredicate) -> Result<(), NavigationDecision> {
    if !predicate.is_authenticated {
        return Err(NavigationDecision {
            outcome: GuardOutcome::Redirect { to: LOGIN_PATH },
            state: GuardState::Unchecked,
        });
    }
    if !predicate.is_approved {
        return Err(NavigationDecision {
            outcome: GuardOutcome::Redirect {
                to: PENDING_APPROVAL_PATH,
            },
            state: GuardState::AuthenticatedChecked,
        });
    }
    Ok(())
}

/// Runs on every non-exempt page.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalGuard;

impl RouteGuard for GlobalGuard {
    fn name(&self) -> &'static str {
        "global"
    }

    fn check(&self, predicate: &AuthzPredicate) -> NavigationDecision {
        match check_identity(predicate) {
            Ok(()) => NavigationDecision::allowed(GuardState::ApprovedChecked),
            Err(decision) => decision,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGuard {
    OfficerOrVp,
    VpOnly,
}

impl RoleGuard {
    pub fn requirement(&self) -> Requirement {
        match self {
            RoleGuard::OfficerOrVp => Requirement::OfficerOrVp,
            RoleGuard::VpOnly => Requirement::Vp,
        }
    }
}

impl RouteGuard for RoleGuard {
    fn name(&self) -> &'static str {
        match self {
            RoleGuard::OfficerOrVp => "officer-or-vp-only",
            RoleGuard::VpOnly => "vp-only",
        }
    }

    fn check(&self, predicate: &AuthzPredicate) -> NavigationDecision {
        if let Err(decision) = check_identity(predicate) {
            return decision;
        }

        let requirement = self.requirement();
        if predicate.satisfies(requirement) {
            NavigationDecision::allowed(GuardState::RoleChecked)
        } else {
            NavigationDecision {
                outcome: GuardOutcome::Denied(Denial::forbidden(requirement)),
                state: GuardState::ApprovedChecked,
            }
        }
    }
}

struct GuardRule {
    prefix: String,
    guard: Arc<dyn RouteGuard>,
}

/// Ordered guards: the global guard, then every rule whose prefix matches.
pub struct GuardChain {
    global: Arc<dyn RouteGuard>,
    rules: Vec<GuardRule>,
    sensitive_prefixes: Vec<String>,
}

impl Default for GuardChain {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardChain {
    pub fn new() -> Self {
        Self {
            global: Arc::new(GlobalGuard),
            rules: Vec::new(),
            sensitive_prefixes: Vec::new(),
        }
    }

    /// Admin pages are VP-only and refresh the session; contact editing
    /// needs an officer or VP.
    pub fn standard() -> Self {
        Self::new()
            .route("/admin", RoleGuard::VpOnly)
            .route("/contacts/edit", RoleGuard::OfficerOrVp)
            .sensitive("/admin")
    }

    pub fn route(mut self, prefix: impl Into<String>, guard: impl RouteGuard + 'static) -> Self {
        self.rules.push(GuardRule {
            prefix: prefix.into(),
            guard: Arc::new(guard),
        });
        self
    }

    pub fn sensitive(mut self, prefix: impl Into<String>) -> Self {
        self.sensitive_prefixes.push(prefix.into());
        self
    }

    pub fn with_sensitive_prefixes(mut self, prefixes: impl IntoIterator<Item = String>) -> Self {
        self.sensitive_prefixes = prefixes.into_iter().collect();
        self
    }

    pub fn is_exempt(path: &str) -> bool {
        EXEMPT_PATHS.contains(&path)
    }

    pub fn is_sensitive(&self, path: &str) -> bool {
        self.sensitive_prefixes.iter().any(|p| matches_prefix(path, p))
    }

    /// Run the chain against an already derived predicate.
    pub fn evaluate_predicate(&self, path: &str, predicate: &AuthzPredicate) -> NavigationDecision {
        if Self::is_exempt(path) {
            return NavigationDecision::allowed(GuardState::Unchecked);
        }

        let mut decision = self.global.check(predicate);
        if !decision.outcome.is_allowed() {
            return decision;
        }

        for rule in self.rules.iter().filter(|r| matches_prefix(path, &r.prefix)) {
            decision = rule.guard.check(predicate);
            if !decision.outcome.is_allowed() {
                tracing::info!(path, guard = rule.guard.name(), outcome = ?decision.outcome, "navigation blocked");
                return decision;
            }
        }
        decision
    }

    /// Resolve the live session, then run the chain.
    ///
    /// Sensitive paths force a refresh first so out-of-band role or approval
    /// changes are seen. Lookup failures are treated as no session.
    pub async fn evaluate(&self, path: &str, source: &dyn SessionSource) -> NavigationDecision {
        if Self::is_exempt(path) {
            return NavigationDecision::allowed(GuardState::Unchecked);
        }

        let session = self.resolve_session(path, source).await;
        let predicate = AuthzPredicate::evaluate(session.as_ref().map(|s| &s.user));
        self.evaluate_predicate(path, &predicate)
    }

    async fn resolve_session(&self, path: &str, source: &dyn SessionSource) -> Option<Session> {
        if self.is_sensitive(path) {
            match source.refresh_session().await {
                Ok(session) => return session,
                Err(e) => {
                    tracing::warn!(path, error = %e, "session refresh failed, using current session");
                }
            }
        }

        match source.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(path, error = %e, "session lookup failed");
                None
            }
        }
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}
