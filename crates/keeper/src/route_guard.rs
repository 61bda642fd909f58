//! Role-based route admission.

use crate::context::SessionSnapshot;
use crate::role::{home_route, Role, LOGIN_ROUTE};
use serde::Serialize;

/// What to do with a navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "to", rename_all = "snake_case")]
pub enum RouteDecision {
    /// The session is still settling; render nothing yet.
    Loading,
    RedirectToLogin,
    Redirect(&'static str),
    Allow,
}

impl RouteDecision {
    /// Destination route for redirects.
    pub fn target(&self) -> Option<&'static str> {
        match self {
            RouteDecision::RedirectToLogin => Some(LOGIN_ROUTE),
            RouteDecision::Redirect(path) => Some(*path),
            _ => None,
        }
    }
}

/// Admission rule for a protected route.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    allowed: Vec<Role>,
    fallback: &'static str,
}

impl RouteGuard {
    /// Guard admitting any of `allowed` roles. An empty list admits every
    /// authenticated user. Role names go through the usual normalization.
    pub fn new<S: AsRef<str>>(allowed: &[S]) -> Self {
        Self {
            allowed: allowed
                .iter()
                .filter_map(|role| Role::parse(role.as_ref()))
                .collect(),
            fallback: "/",
        }
    }

    /// Guard for routes open to every authenticated user.
    pub fn authenticated() -> Self {
        Self {
            allowed: Vec::new(),
            fallback: "/",
        }
    }

    /// Where authenticated users without an allowed role are sent.
    pub fn with_fallback(mut self, path: &'static str) -> Self {
        self.fallback = path;
        self
    }

    pub fn check(&self, session: &SessionSnapshot) -> RouteDecision {
        if session.loading {
            return RouteDecision::Loading;
        }
        if !session.authenticated {
            return RouteDecision::RedirectToLogin;
        }
        let Some(role) = &session.role else {
            return RouteDecision::Loading;
        };
        if self.allowed.is_empty() || self.allowed.contains(role) {
            RouteDecision::Allow
        } else {
            RouteDecision::Redirect(self.fallback)
        }
    }
}

/// Decision for the root route: send authenticated users to their role's
/// home, everyone else to login.
pub fn landing(session: &SessionSnapshot) -> RouteDecision {
    if session.loading {
        return RouteDecision::Loading;
    }
    match &session.role {
        Some(role) if session.authenticated && role.is_known() => {
            RouteDecision::Redirect(home_route(Some(role)))
        }
        _ => RouteDecision::RedirectToLogin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_fsm::AuthState;

    fn snapshot(loading: bool, role: Option<&str>) -> SessionSnapshot {
        let role = role.and_then(Role::parse);
        SessionSnapshot {
            state: if role.is_some() {
                AuthState::LoggedIn
            } else {
                AuthState::NotLoggedIn
            },
            loading,
            authenticated: role.is_some(),
            home_route: home_route(role.as_ref()),
            role,
        }
    }

    #[test]
    fn test_loading_blocks() {
        let guard = RouteGuard::new(&["admin"]);
        assert_eq!(guard.check(&snapshot(true, None)), RouteDecision::Loading);
        assert_eq!(
            guard.check(&snapshot(true, Some("admin"))),
            RouteDecision::Loading
        );
    }

    #[test]
    fn test_unauthenticated_goes_to_login() {
        let guard = RouteGuard::new(&["admin"]);
        let decision = guard.check(&snapshot(false, None));
        assert_eq!(decision, RouteDecision::RedirectToLogin);
        assert_eq!(decision.target(), Some("/login"));
    }

    #[test]
    fn test_allowed_role_passes() {
        let guard = RouteGuard::new(&["Admin", "developer"]);
        assert_eq!(
            guard.check(&snapshot(false, Some("developer"))),
            RouteDecision::Allow
        );
    }

    #[test]
    fn test_legacy_role_name_is_normalized_on_both_sides() {
        let guard = RouteGuard::new(&["user"]);
        assert_eq!(
            guard.check(&snapshot(false, Some("viewer"))),
            RouteDecision::Allow
        );
    }

    #[test]
    fn test_other_role_is_redirected() {
        let guard = RouteGuard::new(&["admin"]).with_fallback("/work");
        assert_eq!(
            guard.check(&snapshot(false, Some("viewer"))),
            RouteDecision::Redirect("/work")
        );
    }

    #[test]
    fn test_token_without_role_waits() {
        let mut session = snapshot(false, None);
        session.authenticated = true;
        assert_eq!(
            RouteGuard::authenticated().check(&session),
            RouteDecision::Loading
        );
    }

    #[test]
    fn test_landing() {
        assert_eq!(
            landing(&snapshot(false, Some("buh_user"))),
            RouteDecision::Redirect("/buh_user")
        );
        assert_eq!(
            landing(&snapshot(false, Some("auditor"))),
            RouteDecision::RedirectToLogin
        );
        assert_eq!(landing(&snapshot(true, None)), RouteDecision::Loading);
    }
}
