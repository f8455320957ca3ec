use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy document `{path}`")]
    #[diagnostic(
        code(rbac::policy_load),
        help("Check that the file exists and is readable")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy document: {0}")]
    #[diagnostic(
        code(rbac::invalid_document),
        help("A policy document is an object with an `action` and a `policies` list")
    )]
    InvalidDocument(String),

    #[error("Unknown action `{0}`")]
    #[diagnostic(
        code(rbac::unknown_action),
        help("Supported actions: ALLOW, DENY")
    )]
    UnknownAction(String),

    #[error("Policies must be an ordered list, got {0}")]
    #[diagnostic(
        code(rbac::unordered_policies),
        help("Evaluation is first-match: write `policies` as a list of {{ \"name\": ..., \"permissions\": [...], \"principals\": [...] }} entries")
    )]
    UnorderedPolicies(String),

    #[error("Duplicate policy name `{0}`")]
    #[diagnostic(code(rbac::duplicate_policy))]
    DuplicatePolicy(String),

    #[error("Invalid policy `{policy}` at `{path}`: {message}")]
    #[diagnostic(code(rbac::invalid_policy))]
    InvalidPolicy {
        policy: String,
        path: String,
        message: String,
    },

    #[error("Unknown rule kind `{kind}` in policy `{policy}` at `{path}`")]
    #[diagnostic(
        code(rbac::unknown_rule),
        help("Permissions: any, and_rules, or_rules, not_rule, header, url_path, destination_port, destination_ip. Principals: any, and_ids, or_ids, not_id, header, authenticated, source_ip, direct_remote_ip, remote_ip")
    )]
    UnknownRuleKind {
        policy: String,
        path: String,
        kind: String,
    },

    #[error("Invalid regex in policy `{policy}` at `{path}`")]
    #[diagnostic(
        code(rbac::invalid_regex),
        help("Patterns use the `regex` crate syntax and always match the whole value")
    )]
    InvalidRegex {
        policy: String,
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid range in policy `{policy}` at `{path}`: {message}")]
    #[diagnostic(
        code(rbac::invalid_range),
        help("Range bounds are integers (or integer strings); `start` is inclusive, `end` is exclusive and optional")
    )]
    InvalidRange {
        policy: String,
        path: String,
        message: String,
    },

    #[error("Invalid CIDR range in policy `{policy}` at `{path}`: {message}")]
    #[diagnostic(
        code(rbac::invalid_cidr),
        help("CIDR syntax: {{ \"address_prefix\": \"10.0.0.0\", \"prefix_len\": 8 }}")
    )]
    InvalidCidr {
        policy: String,
        path: String,
        message: String,
    },

    #[error("No policy document has been published")]
    #[diagnostic(
        code(rbac::not_ready),
        help("Publish a compiled document before evaluating requests")
    )]
    NotReady,

    #[error("JSON error: {0}")]
    #[diagnostic(code(rbac::json))]
    Json(#[from] serde_json::Error),
}
