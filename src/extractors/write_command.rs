//! Output datasets from write commands.

use crate::dataset::DatasetRole;
use crate::error::ExtractError;
use crate::event::LifecycleEvent;
use crate::extraction::{DatasetExtractor, Extraction, RelationRef};
use crate::facets;
use crate::plan::{NodeKind, PlanNode};
use crate::runtime::context::ExtractionContext;

use super::{finish_dataset, relation_composer};

const TARGET_PROPERTY: &str = "target";
const MODE_PROPERTY: &str = "mode";

/// Turns a `WriteCommand` node into the output dataset it writes.
///
/// The target is the node's `target` relation. An `overwrite` or `create`
/// mode adds a `lifecycleStateChange` facet. The command's children (the
/// query feeding the write) are still walked for inputs.
#[derive(Debug, Default)]
pub struct WriteCommandOutputExtractor;

impl WriteCommandOutputExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn lifecycle_state(mode: &str) -> Option<&'static str> {
    match mode.to_ascii_lowercase().as_str() {
        "overwrite" => Some("OVERWRITE"),
        "create" | "errorifexists" => Some("CREATE"),
        "drop" => Some("DROP"),
        "truncate" => Some("TRUNCATE"),
        _ => None,
    }
}

impl DatasetExtractor for WriteCommandOutputExtractor {
    fn name(&self) -> &str {
        "WriteCommandOutputExtractor"
    }

    fn matches_event(&self, _event: &LifecycleEvent) -> bool {
        true
    }

    fn matches_node(&self, node: &PlanNode) -> bool {
        node.kind() == &NodeKind::WriteCommand
    }

    fn extract(
        &self,
        node: &PlanNode,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractError> {
        let target = match RelationRef::from_node(node, TARGET_PROPERTY)? {
            Some(target) => target,
            None => return Ok(Extraction::empty()),
        };

        let (identifier, composer) = match relation_composer(&target, node, context) {
            Some(parts) => parts,
            None => return Ok(Extraction::empty()),
        };

        let composer = composer.add_optional(
            facets::LIFECYCLE_STATE_CHANGE_FACET,
            node.str_property(MODE_PROPERTY)
                .and_then(lifecycle_state)
                .map(|state| facets::lifecycle_state_change_facet(context.producer(), state)),
        );

        let dataset = finish_dataset(DatasetRole::Output, identifier, composer, node, context);
        Ok(Extraction::Datasets(vec![dataset]))
    }
}
