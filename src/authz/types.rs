use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::authz::matcher::Expression;

// ---------- Reserved attribute keys ----------

/// Request path, e.g. "/greet.GreetService/Greet"
pub const PATH: &str = ":path";
pub const METHOD: &str = ":method";
pub const AUTHORITY: &str = ":authority";
/// Authenticated peer identity, e.g. "spiffe://cluster.local/ns/default/sa/httpbin"
pub const SOURCE_PRINCIPAL: &str = ":source.principal";
pub const SOURCE_IP: &str = ":source.ip";
pub const DESTINATION_IP: &str = ":destination.ip";
pub const DESTINATION_PORT: &str = ":destination.port";

// ---------- Attributes ----------

/// Read-only view of the attributes of one request.
///
/// A missing key is "absent", which matchers treat differently from a key
/// that is present with an empty value.
pub trait Attributes {
    fn get(&self, key: &str) -> Option<&str>;
}

impl Attributes for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

impl Attributes for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).copied()
    }
}

impl Attributes for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }
}

// ---------- Policy domain types ----------

/// Document-wide action applied when a policy matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Allow-list: requests are denied unless a policy matches.
    Allow,
    /// Deny-list: requests are allowed unless a policy matches.
    Deny,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("allow") {
            Some(Action::Allow)
        } else if s.eq_ignore_ascii_case("deny") {
            Some(Action::Deny)
        } else {
            None
        }
    }

    /// Whether a request is allowed when no policy matches.
    pub fn default_allowed(self) -> bool {
        matches!(self, Action::Deny)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Allow => write!(f, "ALLOW"),
            Action::Deny => write!(f, "DENY"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Policy {
    pub name: String,
    /// What is being accessed
    pub permissions: Expression,
    /// Who is accessing it
    pub principals: Expression,
}

impl Policy {
    pub fn matches<A: Attributes + ?Sized>(&self, attrs: &A) -> bool {
        self.permissions.evaluate(attrs) && self.principals.evaluate(attrs)
    }
}

// ---------- Results ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacResult {
    pub allowed: bool,
    /// Empty when the document's default decision applied.
    pub matched_policy_name: String,
}

impl RbacResult {
    pub fn default_for(action: Action) -> Self {
        Self {
            allowed: action.default_allowed(),
            matched_policy_name: String::new(),
        }
    }

    pub fn matched(action: Action, policy: &str) -> Self {
        Self {
            allowed: !action.default_allowed(),
            matched_policy_name: policy.to_string(),
        }
    }
}
