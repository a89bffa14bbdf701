pub mod engine;
pub mod errors;
pub mod loader;
pub mod types;

pub use engine::PermissionEvaluator;
pub use types::{PermissionTable, Policy, RateLimits, ANONYMOUS_ROLE, WILDCARD};
