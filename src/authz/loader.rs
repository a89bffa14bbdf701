use std::path::Path;

use crate::authz::errors::AuthzError;
use crate::authz::types::{Policy, ANONYMOUS_ROLE};

/// Load the admission policy from a JSON file and validate it.
pub fn load_policy(path: &Path) -> Result<Policy, AuthzError> {
    let contents = std::fs::read_to_string(path).map_err(|source| AuthzError::PolicyLoadError {
        path: path.display().to_string(),
        source,
    })?;
    let policy: Policy =
        serde_json::from_str(&contents).map_err(|source| AuthzError::PolicyParse {
            path: path.display().to_string(),
            source,
        })?;

    validate_policy(&policy)?;

    tracing::info!(
        path = %path.display(),
        roles = policy.permissions.roles().count(),
        permissions = policy.permissions.entry_count(),
        rate_limits = policy.rate_limits.len(),
        "Loaded admission policy"
    );

    Ok(policy)
}

/// Reject policies that cannot be evaluated meaningfully.
pub fn validate_policy(policy: &Policy) -> Result<(), AuthzError> {
    for (role, resources) in policy.permissions.roles() {
        if role.is_empty() {
            return Err(AuthzError::InvalidPolicy("empty role name".into()));
        }
        for (resource, actions) in resources {
            if resource.is_empty() || actions.keys().any(|a| a.is_empty()) {
                return Err(AuthzError::InvalidPolicy(format!(
                    "empty resource or action name under role `{role}`"
                )));
            }
        }
    }

    for (resource, action, limit) in policy.rate_limits.iter() {
        if limit == 0 {
            return Err(AuthzError::InvalidPolicy(format!(
                "rate limit for `{resource}:{action}` must be at least 1"
            )));
        }
    }

    if policy.permissions.role(ANONYMOUS_ROLE).is_none() {
        tracing::warn!("Policy defines no `{ANONYMOUS_ROLE}` role, anonymous requests will all be denied");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{
                "permissions": {
                    "anonymous": { "auth": { "login": true, "register": true } },
                    "user": { "balance": { "getMyBalance": true } },
                    "super-manager": { "*": { "*": true } }
                },
                "rateLimits": { "auth": { "login": 3, "register": 3 } }
            }"#,
        )
        .unwrap();

        let policy = load_policy(&path).unwrap();
        assert_eq!(policy.permissions.roles().count(), 3);
        assert_eq!(policy.permissions.entry_count(), 4);
        assert_eq!(policy.rate_limits.limit("auth", "register"), Some(3));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = load_policy(Path::new("/nonexistent/policy.json")).unwrap_err();
        assert!(matches!(err, AuthzError::PolicyLoadError { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{ "permissions": { "user": true } }"#).unwrap();

        let err = load_policy(&path).unwrap_err();
        assert!(matches!(err, AuthzError::PolicyParse { .. }));
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{ "rateLimits": { "auth": { "login": 0 } } }"#).unwrap();

        let err = load_policy(&path).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidPolicy(_)));
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(validate_policy(&Policy::default()).is_ok());
    }
}
