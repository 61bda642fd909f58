//! Role normalization and role-based home routes.

use serde::Serialize;
use std::fmt;

/// Route shown to unauthenticated users.
pub const LOGIN_ROUTE: &str = "/login";

/// Old role names still issued by some backends, mapped to their current name.
const LEGACY_ALIASES: &[(&str, &str)] = &[("user", "viewer")];

const HOME_ROUTES: &[(&str, &str)] = &[
    ("admin", "/admin"),
    ("viewer", "/work"),
    ("buh_user", "/buh_user"),
    ("developer", "/developer"),
];

/// Normalize a raw role string: trim, lowercase, map legacy aliases.
///
/// Returns `None` for an empty (or whitespace-only) role.
pub fn normalize_role(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    let canonical = LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or(lowered);
    Some(canonical)
}

/// A normalized user role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Parse a role as received from the backend or storage.
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_role(raw).map(Role)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Landing route for this role, if the role is known.
    pub fn home_route(&self) -> Option<&'static str> {
        HOME_ROUTES
            .iter()
            .find(|(role, _)| *role == self.0)
            .map(|(_, route)| *route)
    }

    pub fn is_known(&self) -> bool {
        self.home_route().is_some()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Landing route for an optional role; unknown or missing roles land on login.
pub fn home_route(role: Option<&Role>) -> &'static str {
    role.and_then(Role::home_route).unwrap_or(LOGIN_ROUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_role("  Admin "), Some("admin".to_string()));
        assert_eq!(normalize_role("BUH_USER"), Some("buh_user".to_string()));
    }

    #[test]
    fn test_legacy_user_maps_to_viewer() {
        assert_eq!(normalize_role("user"), Some("viewer".to_string()));
        assert_eq!(normalize_role(" User"), Some("viewer".to_string()));
    }

    #[test]
    fn test_empty_role_is_none() {
        assert_eq!(normalize_role(""), None);
        assert_eq!(normalize_role("   "), None);
        assert!(Role::parse("").is_none());
    }

    #[test]
    fn test_unknown_role_is_kept() {
        let role = Role::parse("Auditor").unwrap();
        assert_eq!(role.as_str(), "auditor");
        assert!(!role.is_known());
        assert_eq!(role.home_route(), None);
    }

    #[test]
    fn test_home_routes() {
        let cases = [
            ("admin", "/admin"),
            ("viewer", "/work"),
            ("user", "/work"),
            ("buh_user", "/buh_user"),
            ("developer", "/developer"),
        ];
        for (raw, route) in cases {
            let role = Role::parse(raw).unwrap();
            assert_eq!(home_route(Some(&role)), route, "role {}", raw);
        }
    }

    #[test]
    fn test_home_route_falls_back_to_login() {
        assert_eq!(home_route(None), LOGIN_ROUTE);
        let role = Role::parse("ghost").unwrap();
        assert_eq!(home_route(Some(&role)), LOGIN_ROUTE);
    }

    #[test]
    fn test_role_serializes_as_plain_string() {
        let role = Role::parse("Developer").unwrap();
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"developer\"");
        assert_eq!(role.to_string(), "developer");
    }
}
