use crate::authz::types::{PermissionTable, WILDCARD};

/// Decides whether a role may run an action on a resource.
///
/// Lookup order, first present entry wins:
/// 1. `role -> resource -> action`
/// 2. `role -> resource -> *`
/// 3. `role -> * -> *` (allows everything when true)
/// 4. `role -> * -> action`
///
/// Anything else, including an unknown role, is denied.
#[derive(Debug, Clone, Default)]
pub struct PermissionEvaluator {
    table: PermissionTable,
}

impl PermissionEvaluator {
    pub fn new(table: PermissionTable) -> Self {
        Self { table }
    }

    pub fn is_allowed(&self, role: &str, resource: &str, action: &str) -> bool {
        let Some(resources) = self.table.role(role) else {
            return false;
        };

        if let Some(actions) = resources.get(resource) {
            if let Some(allowed) = actions.get(action).or_else(|| actions.get(WILDCARD)) {
                return *allowed;
            }
        }

        if let Some(actions) = resources.get(WILDCARD) {
            if actions.get(WILDCARD).copied().unwrap_or(false) {
                return true;
            }
            if let Some(allowed) = actions.get(action) {
                return *allowed;
            }
        }

        false
    }
}
