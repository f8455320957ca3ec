use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use crate::authz::errors::AuthzError;
use crate::authz::policy::compile_policy;
use crate::authz::types::Action;
use crate::authz::RbacDocument;

/// Knobs applied while compiling a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Upper bound on the compiled size of each regex, in bytes.
    /// `None` keeps the regex crate's default.
    pub regex_size_limit: Option<usize>,
}

/// Read a JSON policy document from disk and compile it.
pub fn load_document(path: &Path, options: &CompileOptions) -> Result<RbacDocument, AuthzError> {
    let contents =
        std::fs::read_to_string(path).map_err(|source| AuthzError::PolicyLoadError {
            path: path.display().to_string(),
            source,
        })?;
    let raw: Value = serde_json::from_str(&contents)?;
    let document = compile_document_with(&raw, options)?;

    tracing::info!(
        path = %path.display(),
        action = %document.action(),
        policies = document.policies().len(),
        "Loaded RBAC policy document"
    );

    Ok(document)
}

/// Compile a parsed policy document with default options.
pub fn compile_document(raw: &Value) -> Result<RbacDocument, AuthzError> {
    compile_document_with(raw, &CompileOptions::default())
}

/// Compile a parsed policy document into an immutable `RbacDocument`.
///
/// `policies` must be a list: evaluation is first-match, and the order of a
/// JSON object's keys is not something the document can be trusted to carry.
pub fn compile_document_with(
    raw: &Value,
    options: &CompileOptions,
) -> Result<RbacDocument, AuthzError> {
    let fields = raw.as_object().ok_or_else(|| {
        AuthzError::InvalidDocument(format!("expected an object at the top level, got `{raw}`"))
    })?;

    let action = match fields.get("action") {
        Some(Value::String(s)) => {
            Action::parse(s).ok_or_else(|| AuthzError::UnknownAction(s.clone()))?
        }
        Some(other) => return Err(AuthzError::UnknownAction(other.to_string())),
        None => {
            return Err(AuthzError::InvalidDocument(
                "missing `action` (ALLOW or DENY)".into(),
            ))
        }
    };

    let entries: &[Value] = match fields.get("policies") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(entries)) => entries,
        Some(Value::Object(_)) => {
            return Err(AuthzError::UnorderedPolicies("an object keyed by policy name".into()))
        }
        Some(other) => return Err(AuthzError::UnorderedPolicies(format!("`{other}`"))),
    };

    let mut seen = HashSet::new();
    let mut policies = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let policy = compile_policy(entry, index, options)?;
        if !seen.insert(policy.name.clone()) {
            return Err(AuthzError::DuplicatePolicy(policy.name));
        }
        policies.push(policy);
    }

    tracing::debug!(
        %action,
        policies = policies.len(),
        max_depth = policies
            .iter()
            .map(|p| p.permissions.depth().max(p.principals.depth()))
            .max()
            .unwrap_or(0),
        "Compiled RBAC policy document"
    );

    Ok(RbacDocument::new(action, policies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn any_policy(name: &str) -> Value {
        json!({
            "name": name,
            "permissions": [{ "any": true }],
            "principals": [{ "any": true }]
        })
    }

    #[test]
    fn test_compile_basic() {
        let doc = compile_document(&json!({
            "action": "DENY",
            "policies": [any_policy("deny-all")]
        }))
        .unwrap();
        assert_eq!(doc.action(), Action::Deny);
        assert_eq!(doc.policies().len(), 1);
        assert_eq!(doc.policies()[0].name, "deny-all");
    }

    #[test]
    fn test_preserves_declaration_order() {
        let names = ["zeta", "alpha", "mid", "beta"];
        let doc = compile_document(&json!({
            "action": "ALLOW",
            "policies": names.iter().map(|n| any_policy(n)).collect::<Vec<_>>()
        }))
        .unwrap();
        let compiled: Vec<&str> = doc.policies().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(compiled, names);
    }

    #[test]
    fn test_missing_policies_is_empty() {
        let doc = compile_document(&json!({ "action": "allow" })).unwrap();
        assert_eq!(doc.action(), Action::Allow);
        assert!(doc.policies().is_empty());
    }

    #[test]
    fn test_unknown_action() {
        let err = compile_document(&json!({ "action": "LOG", "policies": [] })).unwrap_err();
        assert!(matches!(err, AuthzError::UnknownAction(ref a) if a == "LOG"));

        let err = compile_document(&json!({ "action": 1 })).unwrap_err();
        assert!(matches!(err, AuthzError::UnknownAction(_)));

        let err = compile_document(&json!({ "policies": [] })).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidDocument(_)));
    }

    #[test]
    fn test_unordered_policies_rejected() {
        let err = compile_document(&json!({
            "action": "DENY",
            "policies": {
                "deny-all": {
                    "permissions": [{ "any": true }],
                    "principals": [{ "any": true }]
                }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, AuthzError::UnorderedPolicies(_)));
    }

    #[test]
    fn test_duplicate_policy_names() {
        let err = compile_document(&json!({
            "action": "DENY",
            "policies": [any_policy("dup"), any_policy("other"), any_policy("dup")]
        }))
        .unwrap_err();
        assert!(matches!(err, AuthzError::DuplicatePolicy(ref n) if n == "dup"));
    }

    #[test]
    fn test_unnamed_policy_reports_index() {
        let err = compile_document(&json!({
            "action": "DENY",
            "policies": [
                any_policy("first"),
                { "permissions": [{ "any": true }], "principals": [{ "any": true }] }
            ]
        }))
        .unwrap_err();
        assert!(
            matches!(err, AuthzError::InvalidDocument(ref m) if m.starts_with("policies[1]:")),
            "{err:?}"
        );
    }

    #[test]
    fn test_top_level_must_be_object() {
        let err = compile_document(&json!(["DENY"])).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidDocument(_)));
    }

    #[test]
    fn test_regex_size_limit_applies() {
        let raw = json!({
            "action": "DENY",
            "policies": [{
                "name": "huge",
                "permissions": [{ "header": { "name": "x", "safe_regex_match": { "regex": "a{1000}{1000}" } } }],
                "principals": [{ "any": true }]
            }]
        });
        let options = CompileOptions {
            regex_size_limit: Some(1024),
        };
        let err = compile_document_with(&raw, &options).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidRegex { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rbac.json");
        std::fs::write(
            &path,
            r#"{
  "action": "ALLOW",
  "policies": [
    {
      "name": "health",
      "permissions": [{ "url_path": { "path": { "exact": "/healthz" } } }],
      "principals": [{ "any": true }]
    }
  ]
}"#,
        )
        .unwrap();

        let doc = load_document(&path, &CompileOptions::default()).unwrap();
        assert_eq!(doc.action(), Action::Allow);
        assert_eq!(doc.policies()[0].name, "health");
    }

    #[test]
    fn test_load_errors() {
        let err = load_document(Path::new("/nonexistent/rbac.json"), &CompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, AuthzError::PolicyLoadError { .. }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_document(&path, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, AuthzError::Json(_)));
    }
}
