use crate::authz::types::{Attributes, RbacResult};
use crate::authz::RbacDocument;

/// Decide a request against `document`.
///
/// Policies are tried in declaration order; the first one whose permissions
/// and principals both match flips the document's default decision and is
/// reported by name. Later policies are not evaluated.
pub fn filter<A: Attributes + ?Sized>(document: &RbacDocument, attrs: &A) -> RbacResult {
    let action = document.action();

    for policy in document.policies() {
        if policy.matches(attrs) {
            tracing::trace!(policy = %policy.name, %action, "RBAC policy matched");
            return RbacResult::matched(action, &policy.name);
        }
    }

    tracing::trace!(%action, "No RBAC policy matched, applying default");
    RbacResult::default_for(action)
}
