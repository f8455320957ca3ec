pub mod engine;
pub mod errors;
pub mod loader;
pub mod matcher;
pub mod policy;
pub mod store;
pub mod types;

use types::{Action, Policy};

/// Compiled RBAC policy document.
/// Immutable after construction: a configuration change compiles a new
/// document and replaces this one wholesale.
#[derive(Debug, Clone)]
pub struct RbacDocument {
    action: Action,
    /// Declaration order; evaluation is first-match.
    policies: Vec<Policy>,
}

impl RbacDocument {
    pub fn new(action: Action, policies: Vec<Policy>) -> Self {
        Self { action, policies }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn policy(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name == name)
    }
}
