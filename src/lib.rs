//! rbac-engine - request-time RBAC policy evaluation
//!
//! Compiles an RBAC policy document once and evaluates it against the
//! attributes of each incoming request.

pub mod authz;
pub mod settings;

pub use authz::engine::filter;
pub use authz::errors::AuthzError;
pub use authz::loader::{compile_document, compile_document_with, load_document, CompileOptions};
pub use authz::matcher::{CidrRange, Expression, MatchKind, Matcher};
pub use authz::store::RbacFilter;
pub use authz::types::{Action, Attributes, Policy, RbacResult};
pub use authz::RbacDocument;
