//! Best-effort enrichment resolvers.
//!
//! A resolver looks up auxiliary metadata (today: a dataset version) for a
//! node that a structural extractor already turned into a dataset. `None`
//! means the concept does not apply and is not a failure. Errors, panics and
//! timeouts are logged and treated the same as `None`.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::ResolveError;
use crate::extraction::RelationRef;
use crate::facets::{self, FacetComposer};
use crate::plan::PlanNode;
use crate::runtime::context::ExtractionContext;

/// Opaque version identifier returned by a resolver (snapshot id, commit
/// version, etc).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves the current version of the dataset a node refers to.
pub trait VersionResolver: Send + Sync {
    fn name(&self) -> &str;

    /// # Returns
    /// * `Ok(Some(token))` - Current version of the dataset
    /// * `Ok(None)` - The node carries no version information
    /// * `Err(e)` - Lookup failed; treated as absence by [`enrich`]
    fn resolve(&self, node: &PlanNode) -> Result<Option<VersionToken>, ResolveError>;
}

/// Run every resolver in the context against `node` and feed the resulting
/// version facets into `composer`.
///
/// Never creates a dataset and never fails. A resolver that errors or panics
/// contributes nothing, and so does one that times out.
///
/// # Arguments
/// * `composer` - Composer for the dataset being built
/// * `node` - Plan node the dataset was extracted from
/// * `context` - Supplies the resolvers, run in registration order
///
/// # Returns
/// The same composer, with one version facet per resolved token.
pub fn enrich(composer: FacetComposer, node: &PlanNode, context: &ExtractionContext) -> FacetComposer {
    context.resolvers().iter().fold(composer, |composer, resolver| {
        match resolve_guarded(resolver.as_ref(), node) {
            Ok(Some(token)) => {
                tracing::debug!(
                    "Resolver '{}' resolved version '{}' for {} node",
                    resolver.name(),
                    token,
                    node.kind()
                );
                composer.add(
                    facets::VERSION_FACET,
                    facets::version_facet(context.producer(), token.as_str()),
                )
            }
            Ok(None) => composer,
            Err(err) => {
                tracing::warn!(
                    "Resolver '{}' failed on {} node: {}",
                    resolver.name(),
                    node.kind(),
                    err
                );
                composer
            }
        }
    })
}

fn resolve_guarded(
    resolver: &dyn VersionResolver,
    node: &PlanNode,
) -> Result<Option<VersionToken>, ResolveError> {
    panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(node))).unwrap_or_else(|_| {
        Err(ResolveError::Panicked {
            resolver: resolver.name().to_string(),
        })
    })
}

/// Reads a version from node and relation properties.
///
/// Looks at the node's own `version` property first, then at each
/// configured key in the relation's table properties (e.g. `snapshot-id`
/// for Iceberg, `delta.version` for Delta).
pub struct PropertyVersionResolver {
    relation_key: String,
    version_keys: Vec<String>,
}

impl PropertyVersionResolver {
    pub fn new(relation_key: impl Into<String>, version_keys: Vec<String>) -> Self {
        Self {
            relation_key: relation_key.into(),
            version_keys,
        }
    }
}

impl Default for PropertyVersionResolver {
    fn default() -> Self {
        Self::new(
            "relation",
            vec![
                "snapshot-id".to_string(),
                "delta.version".to_string(),
                "version".to_string(),
            ],
        )
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl VersionResolver for PropertyVersionResolver {
    fn name(&self) -> &str {
        "PropertyVersionResolver"
    }

    fn resolve(&self, node: &PlanNode) -> Result<Option<VersionToken>, ResolveError> {
        if let Some(version) = node.property("version").and_then(scalar_to_string) {
            return Ok(Some(VersionToken::new(version)));
        }

        // A malformed relation is the extractor's problem, not ours.
        let relation = match RelationRef::from_node(node, &self.relation_key) {
            Ok(Some(relation)) => relation,
            Ok(None) | Err(_) => return Ok(None),
        };

        Ok(self
            .version_keys
            .iter()
            .find_map(|key| relation.properties.get(key).and_then(scalar_to_string))
            .map(VersionToken::new))
    }
}

/// Bounds the latency of another resolver.
///
/// The wrapped resolver runs on a blocking thread of a private runtime; if it
/// does not answer within the timeout the result is dropped and reported as
/// [`ResolveError::TimedOut`], which [`enrich`] treats as absence.
///
/// Must not be called from within an async runtime context.
pub struct BoundedResolver {
    inner: Arc<dyn VersionResolver>,
    timeout: Duration,
    name: String,
    runtime: Option<tokio::runtime::Runtime>,
}

impl BoundedResolver {
    pub fn new(inner: Arc<dyn VersionResolver>, timeout: Duration) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name("planlineage-resolver")
            .build()?;
        let name = format!("Bounded({})", inner.name());

        Ok(Self {
            inner,
            timeout,
            name,
            runtime: Some(runtime),
        })
    }
}

impl VersionResolver for BoundedResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, node: &PlanNode) -> Result<Option<VersionToken>, ResolveError> {
        let runtime = match self.runtime.as_ref() {
            Some(runtime) => runtime,
            None => return Ok(None),
        };

        let inner = Arc::clone(&self.inner);
        let node = node.clone();
        let timeout = self.timeout;

        // The timer must be created inside the runtime so it can find the driver.
        let outcome = runtime.block_on(async move {
            let task = tokio::task::spawn_blocking(move || inner.resolve(&node));
            tokio::time::timeout(timeout, task).await
        });

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_join_error)) => Err(ResolveError::Panicked {
                resolver: self.inner.name().to_string(),
            }),
            Err(_elapsed) => Err(ResolveError::TimedOut {
                resolver: self.inner.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

impl Drop for BoundedResolver {
    fn drop(&mut self) {
        // Abandon any resolver still running past its deadline.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facets::FacetPolicies;
    use crate::plan::NodeKind;
    use serde_json::json;

    struct Fixed(Option<&'static str>);

    impl VersionResolver for Fixed {
        fn name(&self) -> &str {
            "Fixed"
        }

        fn resolve(&self, _node: &PlanNode) -> Result<Option<VersionToken>, ResolveError> {
            Ok(self.0.map(VersionToken::new))
        }
    }

    struct Failing;

    impl VersionResolver for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn resolve(&self, _node: &PlanNode) -> Result<Option<VersionToken>, ResolveError> {
            Err(ResolveError::LookupFailed("catalog unreachable".to_string()))
        }
    }

    struct Panicking;

    impl VersionResolver for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        fn resolve(&self, _node: &PlanNode) -> Result<Option<VersionToken>, ResolveError> {
            panic!("resolver bug")
        }
    }

    struct Slow(Duration);

    impl VersionResolver for Slow {
        fn name(&self) -> &str {
            "Slow"
        }

        fn resolve(&self, _node: &PlanNode) -> Result<Option<VersionToken>, ResolveError> {
            std::thread::sleep(self.0);
            Ok(Some(VersionToken::new("late")))
        }
    }

    fn context_with(resolvers: Vec<Arc<dyn VersionResolver>>) -> ExtractionContext {
        ExtractionContext::builder()
            .producer("urn:test")
            .resolvers(resolvers)
            .build()
    }

    fn composer() -> FacetComposer {
        FacetComposer::new(Arc::new(FacetPolicies::new()))
    }

    #[test]
    fn test_enrich_present_adds_version_facet() {
        let ctx = context_with(vec![Arc::new(Fixed(Some("v7")))]);
        let node = PlanNode::new(NodeKind::ScanRelation);

        let bag = enrich(composer(), &node, &ctx).build();

        assert_eq!(bag.len(), 1);
        assert_eq!(bag.get("version").unwrap()["datasetVersion"], json!("v7"));
    }

    #[test]
    fn test_enrich_absent_adds_nothing() {
        let ctx = context_with(vec![Arc::new(Fixed(None))]);
        let node = PlanNode::new(NodeKind::ScanRelation);

        let bag = enrich(composer(), &node, &ctx).build();

        assert!(bag.is_empty());
    }

    #[test]
    fn test_enrich_swallows_errors_and_panics() {
        let ctx = context_with(vec![
            Arc::new(Failing),
            Arc::new(Panicking),
            Arc::new(Fixed(Some("v2"))),
        ]);
        let node = PlanNode::new(NodeKind::ScanRelation);

        let bag = enrich(composer(), &node, &ctx).build();

        assert_eq!(bag.get("version").unwrap()["datasetVersion"], json!("v2"));
    }

    #[test]
    fn test_property_resolver_node_version() {
        let node = PlanNode::new(NodeKind::ScanRelation).with_property("version", json!(12));

        let token = PropertyVersionResolver::default().resolve(&node).unwrap();

        assert_eq!(token, Some(VersionToken::new("12")));
    }

    #[test]
    fn test_property_resolver_relation_properties_in_key_order() {
        let node = PlanNode::new(NodeKind::ScanRelation).with_property(
            "relation",
            json!({
                "name": "t",
                "properties": {"delta.version": "5", "snapshot-id": 987654321}
            }),
        );

        let token = PropertyVersionResolver::default().resolve(&node).unwrap();

        assert_eq!(token, Some(VersionToken::new("987654321")));
    }

    #[test]
    fn test_property_resolver_not_applicable() {
        let node = PlanNode::new(NodeKind::ScanRelation)
            .with_property("relation", json!({"name": "csv_table", "format": "csv"}));

        assert_eq!(PropertyVersionResolver::default().resolve(&node).unwrap(), None);
    }

    #[test]
    fn test_bounded_resolver_passes_through() {
        let bounded =
            BoundedResolver::new(Arc::new(Fixed(Some("v1"))), Duration::from_secs(5)).unwrap();
        let node = PlanNode::new(NodeKind::ScanRelation);

        assert_eq!(bounded.resolve(&node).unwrap(), Some(VersionToken::new("v1")));
        assert_eq!(bounded.name(), "Bounded(Fixed)");
    }

    #[test]
    fn test_bounded_resolver_times_out() {
        let bounded = BoundedResolver::new(
            Arc::new(Slow(Duration::from_millis(500))),
            Duration::from_millis(20),
        )
        .unwrap();
        let node = PlanNode::new(NodeKind::ScanRelation);

        let result = bounded.resolve(&node);
        assert!(matches!(result, Err(ResolveError::TimedOut { timeout_ms: 20, .. })));

        let ctx = context_with(vec![Arc::new(bounded)]);
        let bag = enrich(composer(), &node, &ctx).build();
        assert!(bag.is_empty());
    }

    #[test]
    fn test_bounded_resolver_shared_across_threads() {
        let bounded = Arc::new(
            BoundedResolver::new(Arc::new(Fixed(Some("v9"))), Duration::from_secs(5)).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bounded = Arc::clone(&bounded);
                std::thread::spawn(move || {
                    bounded.resolve(&PlanNode::new(NodeKind::ScanRelation))
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), Some(VersionToken::new("v9")));
        }
    }
}
