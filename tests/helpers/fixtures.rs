use rbac_engine::{compile_document, RbacDocument};
use serde_json::Value;
use std::path::PathBuf;

/// Path of a policy fixture under tests/fixtures
pub fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(format!("{}.json", name));
    path
}

/// Load a fixture as an uncompiled document tree
pub fn raw_fixture(name: &str) -> Value {
    let path = fixture_path(name);
    let contents =
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Fixture not found: {:?}", path));
    serde_json::from_str(&contents).expect("Invalid fixture JSON")
}

/// Load and compile a policy fixture
///
/// # Example
/// ```
/// let doc = load_fixture("deny-all");
/// ```
pub fn load_fixture(name: &str) -> RbacDocument {
    compile_document(&raw_fixture(name))
        .unwrap_or_else(|e| panic!("Fixture {name} failed to compile: {e}"))
}
