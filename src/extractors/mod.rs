//! Built-in dataset extractors.
//!
//! Each extractor is independent; the default registry order is
//! scan → relation → write, which only matters when two of them recognize
//! the same node kind.

pub mod extension;
pub mod relation;
pub mod scan_relation;
pub mod write_command;

pub use extension::DeclaredLineageVisitor;
pub use relation::RelationInputExtractor;
pub use scan_relation::ScanRelationInputExtractor;
pub use write_command::WriteCommandOutputExtractor;

use std::sync::Arc;

use crate::dataset::{Dataset, DatasetIdentifier, DatasetRole};
use crate::extraction::{DatasetExtractor, RelationRef};
use crate::facets::{self, FacetComposer};
use crate::plan::PlanNode;
use crate::resolvers;
use crate::runtime::context::ExtractionContext;

/// The built-in extractors, in default registration order.
pub fn default_extractors() -> Vec<Arc<dyn DatasetExtractor>> {
    vec![
        Arc::new(ScanRelationInputExtractor::new()),
        Arc::new(RelationInputExtractor::new()),
        Arc::new(WriteCommandOutputExtractor::new()),
    ]
}

/// Generic construction path shared by the relation extractors.
///
/// Builds the structural facets from `relation` and returns them with the
/// dataset identity, or `None` when the relation has no usable identity.
pub(crate) fn relation_composer(
    relation: &RelationRef,
    node: &PlanNode,
    context: &ExtractionContext,
) -> Option<(DatasetIdentifier, FacetComposer)> {
    let identifier = match relation.identifier() {
        Some(identifier) => identifier,
        None => {
            tracing::debug!("{} node has a relation without identity, skipping", node.kind());
            return None;
        }
    };
    let producer = context.producer();

    let mut composer = context.composer().add(
        facets::DATA_SOURCE_FACET,
        facets::data_source_facet(
            producer,
            &identifier.namespace,
            relation.location.as_deref().unwrap_or(&identifier.namespace),
        ),
    );

    if !relation.schema.is_empty() {
        composer = composer.add(
            facets::SCHEMA_FACET,
            facets::schema_facet(producer, &relation.schema),
        );
    }

    if !relation.symlinks.is_empty() {
        let links: Vec<(String, String, String)> = relation
            .symlinks
            .iter()
            .map(|s| (s.namespace.clone(), s.name.clone(), s.kind.clone()))
            .collect();
        composer = composer.add(facets::SYMLINKS_FACET, facets::symlinks_facet(producer, &links));
    }

    if let Some(provider) = relation.provider.as_deref() {
        composer = composer.add(
            facets::STORAGE_FACET,
            facets::storage_facet(producer, provider, relation.format.as_deref()),
        );
    }

    Some((identifier, composer))
}

/// Let the context's resolvers enrich `composer`, then freeze the dataset.
pub(crate) fn finish_dataset(
    role: DatasetRole,
    identifier: DatasetIdentifier,
    composer: FacetComposer,
    node: &PlanNode,
    context: &ExtractionContext,
) -> Dataset {
    let composer = resolvers::enrich(composer, node, context);
    Dataset::with_role(role, identifier, composer.build())
}

pub(crate) fn relation_dataset(
    role: DatasetRole,
    relation: &RelationRef,
    node: &PlanNode,
    context: &ExtractionContext,
) -> Option<Dataset> {
    relation_composer(relation, node, context)
        .map(|(identifier, composer)| finish_dataset(role, identifier, composer, node, context))
}
