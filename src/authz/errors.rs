use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(tungsten::authz::policy_load),
        help("Check that the file exists and is readable")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy file `{path}`")]
    #[diagnostic(
        code(tungsten::authz::policy_parse),
        help("A policy file is a JSON object with optional `permissions` and `rateLimits` maps")
    )]
    PolicyParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(tungsten::authz::invalid_policy),
        help("Role, resource and action names must be non-empty and rate limits at least 1")
    )]
    InvalidPolicy(String),
}
