//! Identity authorization for terminal launches.
//!
//! The engine never decides policy itself: before launching a shell as
//! anyone other than the server's own OS user it consults an
//! [`IdentityAuthorizer`]. The production implementation is a static
//! allow-list derived from configuration; tests plug in their own.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The OS user a shell session runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The server process's own user; never requires authorization.
    OwnUser,
    /// A named OS user; requires authorization and a privilege-switch tool.
    User(String),
}

impl Identity {
    pub fn from_request(identity: Option<&str>) -> Self {
        match identity {
            None | Some("") | Some("self") => Identity::OwnUser,
            Some(name) => Identity::User(name.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Identity::OwnUser => "self",
            Identity::User(name) => name,
        }
    }
}

/// Claims describing the authenticated caller, produced by the auth
/// middleware and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerClaims {
    pub subject: String,
}

/// Policy collaborator consulted before any non-self launch.
pub trait IdentityAuthorizer: Send + Sync {
    /// Whether `claims` may run a shell as `identity`. Never called for
    /// [`Identity::OwnUser`].
    fn authorize(&self, identity: &Identity, claims: &CallerClaims) -> bool;

    /// Identity labels the caller may request, `"self"` included.
    fn allowed_identities(&self, claims: &CallerClaims) -> Vec<String>;
}

/// Allow-list authorizer backed by the server configuration.
pub struct StaticAuthorizer {
    allowed: Vec<String>,
}

impl StaticAuthorizer {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }
}

impl IdentityAuthorizer for StaticAuthorizer {
    fn authorize(&self, identity: &Identity, _claims: &CallerClaims) -> bool {
        match identity {
            Identity::OwnUser => true,
            Identity::User(name) => self.allowed.iter().any(|a| a == name),
        }
    }

    fn allowed_identities(&self, _claims: &CallerClaims) -> Vec<String> {
        let mut labels = vec!["self".to_string()];
        labels.extend(self.allowed.iter().cloned());
        labels
    }
}

/// Locate the privilege-switch tool on `$PATH`.
///
/// Launching as another identity fails closed when this returns `None`.
pub fn privilege_tool_path() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join("sudo");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> CallerClaims {
        CallerClaims {
            subject: "admin".to_string(),
        }
    }

    #[test]
    fn own_user_is_always_allowed() {
        let authz = StaticAuthorizer::new(vec![]);
        assert!(authz.authorize(&Identity::OwnUser, &claims()));
    }

    #[test]
    fn named_user_requires_allow_list_entry() {
        let authz = StaticAuthorizer::new(vec!["deploy".to_string()]);
        assert!(authz.authorize(&Identity::User("deploy".to_string()), &claims()));
        assert!(!authz.authorize(&Identity::User("root".to_string()), &claims()));
    }

    #[test]
    fn allowed_identities_start_with_self() {
        let authz = StaticAuthorizer::new(vec!["deploy".to_string()]);
        let labels = authz.allowed_identities(&claims());
        assert_eq!(labels, vec!["self".to_string(), "deploy".to_string()]);
    }

    #[test]
    fn identity_from_request_normalizes_self() {
        assert_eq!(Identity::from_request(None), Identity::OwnUser);
        assert_eq!(Identity::from_request(Some("self")), Identity::OwnUser);
        assert_eq!(Identity::from_request(Some("")), Identity::OwnUser);
        assert_eq!(
            Identity::from_request(Some("deploy")),
            Identity::User("deploy".to_string())
        );
    }
}
