use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key matching any resource or any action at its level of the table.
pub const WILDCARD: &str = "*";

/// Role assumed by callers without a valid token.
pub const ANONYMOUS_ROLE: &str = "anonymous";

/// action -> allowed
pub type ActionGrants = HashMap<String, bool>;

/// resource -> action -> allowed
pub type ResourceGrants = HashMap<String, ActionGrants>;

/// role -> resource -> action -> allowed, with `*` wildcards at the resource and action levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable(HashMap<String, ResourceGrants>);

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, mostly for static defaults and tests.
    pub fn grant(mut self, role: &str, resource: &str, action: &str, allowed: bool) -> Self {
        self.0
            .entry(role.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_default()
            .insert(action.to_string(), allowed);
        self
    }

    pub fn role(&self, role: &str) -> Option<&ResourceGrants> {
        self.0.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = (&String, &ResourceGrants)> {
        self.0.iter()
    }

    pub fn entry_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|resources| resources.values())
            .map(|actions| actions.len())
            .sum()
    }
}

/// resource -> action -> maximum requests per window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLimits(HashMap<String, HashMap<String, u32>>);

impl RateLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, resource: &str, action: &str, limit: u32) -> Self {
        self.0
            .entry(resource.to_string())
            .or_default()
            .insert(action.to_string(), limit);
        self
    }

    /// `None` means the action is not rate limited.
    pub fn limit(&self, resource: &str, action: &str) -> Option<u32> {
        self.0.get(resource)?.get(action).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, u32)> {
        self.0.iter().flat_map(|(resource, actions)| {
            actions
                .iter()
                .map(move |(action, limit)| (resource.as_str(), action.as_str(), *limit))
        })
    }

    pub fn len(&self) -> usize {
        self.0.values().map(|actions| actions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Static admission policy, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub permissions: PermissionTable,
    /// Requests per rate window (one minute unless configured otherwise).
    #[serde(default)]
    pub rate_limits: RateLimits,
}

impl Default for Policy {
    fn default() -> Self {
        let permissions = PermissionTable::new()
            .grant(ANONYMOUS_ROLE, "auth", "login", true)
            .grant(ANONYMOUS_ROLE, "auth", "logout", true)
            .grant(ANONYMOUS_ROLE, "auth", "checkToken", true)
            .grant(ANONYMOUS_ROLE, "auth", "register", true)
            .grant(ANONYMOUS_ROLE, "download", "downloadAPK", true)
            .grant("user", "auth", "login", true)
            .grant("user", "auth", "logout", true)
            .grant("user", "auth", "checkToken", true)
            .grant("user", "auth", "getMyUser", true)
            .grant("user", "balance", "getMyBalance", true)
            .grant("user", "bankaccount", "getAccountInfo", true)
            .grant("user", "product", "getProductByCode", true)
            .grant("user", "product", "payShoppingCart", true)
            .grant("user", "download", "downloadAPK", true)
            .grant("super-manager", WILDCARD, WILDCARD, true);

        let rate_limits = RateLimits::new()
            .with_limit("auth", "login", 3)
            .with_limit("auth", "register", 3);

        Self {
            permissions,
            rate_limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_deserialize() {
        let policy: Policy = serde_json::from_str(
            r#"{
                "permissions": {
                    "anonymous": { "auth": { "login": true } },
                    "admin": { "*": { "*": true } }
                },
                "rateLimits": { "auth": { "login": 5 } }
            }"#,
        )
        .unwrap();

        assert_eq!(policy.permissions.entry_count(), 2);
        assert!(policy.permissions.role("admin").unwrap()[WILDCARD][WILDCARD]);
        assert_eq!(policy.rate_limits.limit("auth", "login"), Some(5));
        assert_eq!(policy.rate_limits.limit("auth", "register"), None);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let policy: Policy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.permissions.entry_count(), 0);
        assert!(policy.rate_limits.is_empty());
    }

    #[test]
    fn test_default_policy_limits_login_and_register() {
        let policy = Policy::default();
        assert_eq!(policy.rate_limits.limit("auth", "login"), Some(3));
        assert_eq!(policy.rate_limits.limit("auth", "register"), Some(3));
        assert_eq!(policy.rate_limits.len(), 2);
        assert!(policy.permissions.role(ANONYMOUS_ROLE).is_some());
    }
}
