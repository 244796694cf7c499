//! Shared read-only context for dataset extraction.
//!
//! One context is built at engine start and shared (behind `Arc`) by every
//! dispatch. Nothing in it is mutated afterwards, so concurrent dispatches
//! read it without locking.

use std::sync::Arc;

use crate::extraction::{ExtensionVisitor, RelationRef};
use crate::facets::{FacetComposer, FacetPolicies};
use crate::resolvers::VersionResolver;
use crate::version;

/// Context handed to every extractor invocation.
#[derive(Clone)]
pub struct ExtractionContext {
    producer: String,
    policies: Arc<FacetPolicies>,
    resolvers: Vec<Arc<dyn VersionResolver>>,
    extension_visitors: Vec<Arc<dyn ExtensionVisitor>>,
}

impl ExtractionContext {
    /// Start a builder with the process producer URI and default policies.
    ///
    /// # Example
    /// ```ignore
    /// use std::sync::Arc;
    /// use planlineage::ExtractionContext;
    /// use planlineage::facets::{FacetPolicies, MergePolicy};
    ///
    /// let context = ExtractionContext::builder()
    ///     .producer("urn:example")
    ///     .policies(FacetPolicies::new().with_policy("symlinks", MergePolicy::Additive))
    ///     .resolver(Arc::new(my_resolver))
    ///     .build();
    /// ```
    pub fn builder() -> ExtractionContextBuilder {
        ExtractionContextBuilder::default()
    }

    /// Context with the process producer URI and no resolvers or visitors.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Producer URI stamped onto every facet.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Fresh composer for one dataset, using the configured merge policies.
    pub fn composer(&self) -> FacetComposer {
        FacetComposer::new(Arc::clone(&self.policies))
    }

    pub fn resolvers(&self) -> &[Arc<dyn VersionResolver>] {
        &self.resolvers
    }

    pub fn extension_visitors(&self) -> &[Arc<dyn ExtensionVisitor>] {
        &self.extension_visitors
    }

    /// First extension visitor defined at `relation`, in registration order.
    pub fn extension_for(&self, relation: &RelationRef) -> Option<&Arc<dyn ExtensionVisitor>> {
        self.extension_visitors
            .iter()
            .find(|visitor| visitor.is_defined_at(relation))
    }
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ExtractionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionContext")
            .field("producer", &self.producer)
            .field("policies", &self.policies)
            .field(
                "resolvers",
                &self.resolvers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field(
                "extension_visitors",
                &self.extension_visitors.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Default)]
pub struct ExtractionContextBuilder {
    producer: Option<String>,
    policies: FacetPolicies,
    resolvers: Vec<Arc<dyn VersionResolver>>,
    extension_visitors: Vec<Arc<dyn ExtensionVisitor>>,
}

impl ExtractionContextBuilder {
    /// Override the producer URI (defaults to [`version::producer_uri`]).
    pub fn producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    pub fn policies(mut self, policies: FacetPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn VersionResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn resolvers(mut self, resolvers: Vec<Arc<dyn VersionResolver>>) -> Self {
        self.resolvers.extend(resolvers);
        self
    }

    pub fn extension_visitor(mut self, visitor: Arc<dyn ExtensionVisitor>) -> Self {
        self.extension_visitors.push(visitor);
        self
    }

    pub fn build(self) -> ExtractionContext {
        ExtractionContext {
            producer: self
                .producer
                .unwrap_or_else(|| version::producer_uri().to_string()),
            policies: Arc::new(self.policies),
            resolvers: self.resolvers,
            extension_visitors: self.extension_visitors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::error::ExtractError;
    use crate::facets::MergePolicy;

    struct ProviderVisitor(&'static str);

    impl ExtensionVisitor for ProviderVisitor {
        fn name(&self) -> &str {
            self.0
        }

        fn is_defined_at(&self, relation: &RelationRef) -> bool {
            relation.provider.as_deref() == Some(self.0)
        }

        fn apply(
            &self,
            _relation: &RelationRef,
            _context: &ExtractionContext,
        ) -> Result<Vec<Dataset>, ExtractError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_empty_context_uses_process_producer() {
        let ctx = ExtractionContext::empty();

        assert_eq!(ctx.producer(), version::producer_uri());
        assert!(ctx.resolvers().is_empty());
        assert!(ctx.extension_visitors().is_empty());
    }

    #[test]
    fn test_composer_uses_context_policies() {
        let ctx = ExtractionContext::builder()
            .producer("urn:test")
            .policies(FacetPolicies::new().with_policy("tags", MergePolicy::Additive))
            .build();

        let bag = ctx
            .composer()
            .add("tags", serde_json::json!(["a"]))
            .add("tags", serde_json::json!(["b"]))
            .build();

        assert_eq!(bag.get("tags"), Some(&serde_json::json!(["a", "b"])));
    }

    #[test]
    fn test_extension_for_picks_first_defined() {
        let ctx = ExtractionContext::builder()
            .producer("urn:test")
            .extension_visitor(Arc::new(ProviderVisitor("iceberg")))
            .extension_visitor(Arc::new(ProviderVisitor("delta")))
            .build();

        let relation = RelationRef {
            provider: Some("delta".to_string()),
            ..Default::default()
        };
        assert_eq!(ctx.extension_for(&relation).map(|v| v.name()), Some("delta"));

        let plain = RelationRef::default();
        assert!(ctx.extension_for(&plain).is_none());
    }
}
