//! Execution-plan tree as seen by the extraction engine.
//!
//! The engine itself only looks at a node's [`NodeKind`] and its children.
//! Properties are an opaque JSON map that extractors and resolvers may read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminant of a plan node.
///
/// Known shapes get their own variant so extractors can match on them
/// directly; anything else is carried through as [`NodeKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// A scan over a relation (the relation itself is a node property).
    ScanRelation,
    /// A relation read directly, without a scan wrapper.
    Relation,
    /// A command writing into a target table or path.
    WriteCommand,
    Project,
    Filter,
    Join,
    Aggregate,
    Union,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::ScanRelation => "ScanRelation",
            NodeKind::Relation => "Relation",
            NodeKind::WriteCommand => "WriteCommand",
            NodeKind::Project => "Project",
            NodeKind::Filter => "Filter",
            NodeKind::Join => "Join",
            NodeKind::Aggregate => "Aggregate",
            NodeKind::Union => "Union",
            NodeKind::Other(name) => name,
        }
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ScanRelation" => NodeKind::ScanRelation,
            "Relation" => NodeKind::Relation,
            "WriteCommand" => NodeKind::WriteCommand,
            "Project" => NodeKind::Project,
            "Filter" => NodeKind::Filter,
            "Join" => NodeKind::Join,
            "Aggregate" => NodeKind::Aggregate,
            "Union" => NodeKind::Union,
            _ => NodeKind::Other(value),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(value: &str) -> Self {
        NodeKind::from(value.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node of an execution plan.
///
/// # Example
///
/// ```
/// use planlineage::plan::{NodeKind, PlanNode};
/// use serde_json::json;
///
/// let plan = PlanNode::new(NodeKind::Project).with_child(
///     PlanNode::new(NodeKind::ScanRelation)
///         .with_property("relation", json!({"namespace": "s3://bucket", "name": "events"})),
/// );
///
/// assert_eq!(plan.children().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(kind: impl Into<NodeKind>) -> Self {
        Self {
            kind: kind.into(),
            properties: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = PlanNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn children(&self) -> &[PlanNode] {
        &self.children
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// String-valued property, `None` if absent or not a string.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn subtree_size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}
