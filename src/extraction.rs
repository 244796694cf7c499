//! Extractor contract.
//!
//! Every dataset extractor answers two questions ("does this event concern
//! me?", "does this node concern me?") and, when both are yes, turns the
//! node into zero or more [`Dataset`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::{Dataset, DatasetIdentifier};
use crate::error::ExtractError;
use crate::event::LifecycleEvent;
use crate::facets::SchemaField;
use crate::plan::PlanNode;
use crate::runtime::context::ExtractionContext;

/// Result of a successful extraction at one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Datasets built for this node; the walker still visits its children.
    Datasets(Vec<Dataset>),
    /// A more specific delegate recognized the node's sub-relation and
    /// produced these datasets. The subtree is consumed: the walker does not
    /// descend into it.
    Delegated(Vec<Dataset>),
}

impl Extraction {
    /// Nothing to report for this node.
    pub fn empty() -> Self {
        Extraction::Datasets(Vec::new())
    }

    pub fn datasets(&self) -> &[Dataset] {
        match self {
            Extraction::Datasets(d) | Extraction::Delegated(d) => d,
        }
    }

    pub fn into_datasets(self) -> Vec<Dataset> {
        match self {
            Extraction::Datasets(d) | Extraction::Delegated(d) => d,
        }
    }

    pub fn consumes_subtree(&self) -> bool {
        matches!(self, Extraction::Delegated(_))
    }
}

/// A unit that recognizes one plan-node shape and produces datasets from it.
///
/// Predicates must be total and side-effect free. `extract` may only read
/// the node and the shared context. Lack of information is reported as
/// [`Extraction::empty`], not as an error.
///
/// # Example
///
/// ```ignore
/// use planlineage::{DatasetExtractor, Extraction, LifecycleEvent, PlanNode};
///
/// struct Noop;
///
/// impl DatasetExtractor for Noop {
///     fn name(&self) -> &str { "Noop" }
///     fn matches_event(&self, event: &LifecycleEvent) -> bool { event.is_start() }
///     fn matches_node(&self, _node: &PlanNode) -> bool { false }
///     fn extract(&self, _node: &PlanNode, _ctx: &ExtractionContext)
///         -> Result<Extraction, ExtractError> {
///         Ok(Extraction::empty())
///     }
/// }
/// ```
pub trait DatasetExtractor: Send + Sync {
    /// Identity used in logs and failure reports.
    fn name(&self) -> &str;

    /// Whether this extractor applies to events of this kind.
    fn matches_event(&self, event: &LifecycleEvent) -> bool;

    /// Whether this extractor recognizes the node.
    fn matches_node(&self, node: &PlanNode) -> bool;

    /// Produce datasets for a node both predicates accepted.
    ///
    /// # Returns
    /// * `Ok(Extraction::Datasets(..))` - Zero or more datasets; children are still walked
    /// * `Ok(Extraction::Delegated(..))` - Datasets covering the whole subtree
    /// * `Err(e)` - Recorded as a failure; the walk continues
    fn extract(
        &self,
        node: &PlanNode,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractError>;
}

/// A delegate for relations whose table knows its own lineage.
///
/// Consulted by relation extractors before their generic path; when a
/// visitor is defined at the relation, its result replaces the generic one.
pub trait ExtensionVisitor: Send + Sync {
    fn name(&self) -> &str;

    fn is_defined_at(&self, relation: &RelationRef) -> bool;

    fn apply(
        &self,
        relation: &RelationRef,
        context: &ExtractionContext,
    ) -> Result<Vec<Dataset>, ExtractError>;
}

/// Symlink entry declared on a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSymlink {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "type", default = "default_symlink_type")]
    pub kind: String,
}

fn default_symlink_type() -> String {
    "TABLE".to_string()
}

/// Relation descriptor read from a node property.
///
/// Every field is optional: hosts describe relations with whatever they
/// know, and extractors decide whether that is enough for an identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationRef {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub schema: Vec<SchemaField>,
    #[serde(default)]
    pub symlinks: Vec<RelationSymlink>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl RelationRef {
    /// Read the relation stored under `key`.
    ///
    /// # Returns
    /// * `Ok(Some(relation))` - The property holds a relation object
    /// * `Ok(None)` - The property is absent or null
    /// * `Err(ExtractError::InvalidProperty)` - The property is present but
    ///   not a relation object
    pub fn from_node(node: &PlanNode, key: &str) -> Result<Option<Self>, ExtractError> {
        match node.property(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ExtractError::InvalidProperty {
                    property: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Dataset identity: explicit namespace and name first, then the location.
    pub fn identifier(&self) -> Option<DatasetIdentifier> {
        match (&self.namespace, &self.name) {
            (Some(namespace), Some(name)) => Some(DatasetIdentifier::new(namespace, name)),
            _ => self.location.as_deref().and_then(identifier_from_location),
        }
    }
}

/// Split a location URI into namespace (scheme + authority) and name (path).
///
/// `s3://bucket/warehouse/orders` becomes (`s3://bucket`, `/warehouse/orders`);
/// a bare path becomes (`file`, path). Blank locations yield `None`.
///
/// # Example
/// ```ignore
/// use planlineage::extraction::identifier_from_location;
///
/// let id = identifier_from_location("s3://lake/silver/customers").unwrap();
/// assert_eq!(id.namespace, "s3://lake");
/// assert_eq!(id.name, "/silver/customers");
/// ```
pub fn identifier_from_location(location: &str) -> Option<DatasetIdentifier> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }

    match location.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, "/"),
            };
            Some(DatasetIdentifier::new(format!("{}://{}", scheme, authority), path))
        }
        None => Some(DatasetIdentifier::new("file", location)),
    }
}
