use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::authz::engine;
use crate::authz::errors::AuthzError;
use crate::authz::loader::{compile_document_with, CompileOptions};
use crate::authz::types::{Attributes, RbacResult};
use crate::authz::RbacDocument;

/// Holds the published policy documents for a running server.
///
/// Readers clone the current `Arc` and evaluate without holding the lock, so
/// an update never exposes a half-replaced document to an in-flight request.
#[derive(Debug, Default)]
pub struct RbacFilter {
    enforced: RwLock<Option<Arc<RbacDocument>>>,
    /// Evaluated and logged, never enforced.
    shadow: RwLock<Option<Arc<RbacDocument>>>,
    options: CompileOptions,
}

impl RbacFilter {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn with_document(document: RbacDocument) -> Self {
        let filter = Self::default();
        filter.publish(document);
        filter
    }

    /// Replace the enforced document.
    pub fn publish(&self, document: RbacDocument) {
        tracing::info!(
            action = %document.action(),
            policies = document.policies().len(),
            "Publishing RBAC policy document"
        );
        *self.enforced.write() = Some(Arc::new(document));
    }

    /// Replace (or clear) the shadow document.
    pub fn publish_shadow(&self, document: Option<RbacDocument>) {
        if let Some(doc) = &document {
            tracing::info!(
                action = %doc.action(),
                policies = doc.policies().len(),
                "Publishing shadow RBAC policy document"
            );
        }
        *self.shadow.write() = document.map(Arc::new);
    }

    /// Compile `raw` and publish it. On error the previously published
    /// document stays in force.
    pub fn update(&self, raw: &Value) -> Result<(), AuthzError> {
        match compile_document_with(raw, &self.options) {
            Ok(document) => {
                self.publish(document);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected RBAC policy update, keeping current document");
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Option<Arc<RbacDocument>> {
        self.enforced.read().clone()
    }

    pub fn current_shadow(&self) -> Option<Arc<RbacDocument>> {
        self.shadow.read().clone()
    }

    /// Decide a request against the enforced document.
    pub fn check<A: Attributes + ?Sized>(&self, attrs: &A) -> Result<RbacResult, AuthzError> {
        let document = self.current().ok_or(AuthzError::NotReady)?;
        let result = engine::filter(&document, attrs);

        if let Some(shadow) = self.current_shadow() {
            let shadow_result = engine::filter(&shadow, attrs);
            tracing::debug!(
                allowed = result.allowed,
                policy = %result.matched_policy_name,
                shadow_allowed = shadow_result.allowed,
                shadow_policy = %shadow_result.matched_policy_name,
                "Shadow RBAC decision"
            );
        }

        if !result.allowed {
            tracing::debug!(policy = %result.matched_policy_name, "RBAC denied request");
        }
        Ok(result)
    }
}
