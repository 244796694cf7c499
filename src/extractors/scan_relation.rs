//! Input datasets from scans over relations, on query start.

use crate::dataset::DatasetRole;
use crate::error::ExtractError;
use crate::event::LifecycleEvent;
use crate::extraction::{DatasetExtractor, Extraction, RelationRef};
use crate::plan::{NodeKind, PlanNode};
use crate::runtime::context::ExtractionContext;

use super::relation_dataset;

const RELATION_PROPERTY: &str = "relation";

/// Turns a `ScanRelation` node into the input dataset it reads.
///
/// If an extension visitor recognizes the scanned relation, its datasets are
/// returned as a delegated extraction and the generic path is skipped.
#[derive(Debug, Default)]
pub struct ScanRelationInputExtractor;

impl ScanRelationInputExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetExtractor for ScanRelationInputExtractor {
    fn name(&self) -> &str {
        "ScanRelationInputExtractor"
    }

    fn matches_event(&self, event: &LifecycleEvent) -> bool {
        event.is_start()
    }

    fn matches_node(&self, node: &PlanNode) -> bool {
        node.kind() == &NodeKind::ScanRelation
    }

    fn extract(
        &self,
        node: &PlanNode,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractError> {
        let relation = match RelationRef::from_node(node, RELATION_PROPERTY)? {
            Some(relation) => relation,
            None => return Ok(Extraction::empty()),
        };

        if let Some(visitor) = context.extension_for(&relation) {
            tracing::debug!(
                "Scan over {:?} delegated to extension '{}'",
                relation.name,
                visitor.name()
            );
            return visitor.apply(&relation, context).map(Extraction::Delegated);
        }

        Ok(Extraction::Datasets(
            relation_dataset(DatasetRole::Input, &relation, node, context)
                .into_iter()
                .collect(),
        ))
    }
}
