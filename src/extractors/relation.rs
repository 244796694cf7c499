//! Input datasets from relations read without a scan wrapper.

use crate::dataset::DatasetRole;
use crate::error::ExtractError;
use crate::event::LifecycleEvent;
use crate::extraction::{DatasetExtractor, Extraction, RelationRef};
use crate::plan::{NodeKind, PlanNode};
use crate::runtime::context::ExtractionContext;

use super::relation_dataset;

/// Turns a `Relation` node into an input dataset, on start and end events.
///
/// The relation is described by the node's `relation` property, or by the
/// node's own properties when that is absent.
#[derive(Debug, Default)]
pub struct RelationInputExtractor;

impl RelationInputExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetExtractor for RelationInputExtractor {
    fn name(&self) -> &str {
        "RelationInputExtractor"
    }

    fn matches_event(&self, _event: &LifecycleEvent) -> bool {
        true
    }

    fn matches_node(&self, node: &PlanNode) -> bool {
        node.kind() == &NodeKind::Relation
    }

    fn extract(
        &self,
        node: &PlanNode,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractError> {
        let relation = match RelationRef::from_node(node, "relation")? {
            Some(relation) => relation,
            None => serde_json::from_value(serde_json::Value::Object(node.properties().clone()))
                .map_err(|e| ExtractError::MalformedNode {
                    kind: node.kind().to_string(),
                    reason: e.to_string(),
                })?,
        };

        Ok(Extraction::Datasets(
            relation_dataset(DatasetRole::Input, &relation, node, context)
                .into_iter()
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetIdentifier;
    use serde_json::json;

    fn ctx() -> ExtractionContext {
        ExtractionContext::builder().producer("urn:test").build()
    }

    #[test]
    fn test_relation_from_inline_properties() {
        let node = PlanNode::new(NodeKind::Relation)
            .with_property("location", json!("hdfs://nn:8020/data/events"));

        let datasets = RelationInputExtractor::new()
            .extract(&node, &ctx())
            .unwrap()
            .into_datasets();

        assert_eq!(datasets.len(), 1);
        assert_eq!(
            datasets[0].identifier(),
            &DatasetIdentifier::new("hdfs://nn:8020", "/data/events")
        );
    }

    #[test]
    fn test_relation_from_nested_property() {
        let node = PlanNode::new(NodeKind::Relation)
            .with_property("relation", json!({"namespace": "kafka://broker", "name": "clicks"}));

        let datasets = RelationInputExtractor::new()
            .extract(&node, &ctx())
            .unwrap()
            .into_datasets();

        assert_eq!(datasets[0].name(), "clicks");
        assert_eq!(datasets[0].role(), DatasetRole::Input);
    }

    #[test]
    fn test_matches_any_event() {
        let extractor = RelationInputExtractor::new();
        let node = PlanNode::new(NodeKind::Relation);

        assert!(extractor.matches_event(&LifecycleEvent::start(node.clone())));
        assert!(extractor.matches_event(&LifecycleEvent::end(node)));
    }
}
