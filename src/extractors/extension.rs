//! Extension visitor for tables that declare their own lineage.
//!
//! Some table providers wrap other sources (federated views, virtual
//! tables) and publish the datasets they actually read in a
//! `lineage.inputs` table property. For those tables the declared list is
//! more accurate than the wrapper's own identity.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::dataset::{Dataset, DatasetIdentifier};
use crate::error::ExtractError;
use crate::extraction::{ExtensionVisitor, RelationRef};
use crate::facets;
use crate::runtime::context::ExtractionContext;

pub const DECLARED_INPUTS_PROPERTY: &str = "lineage.inputs";

#[derive(Debug, Deserialize)]
struct DeclaredInput {
    namespace: String,
    name: String,
}

/// Recognizes relations from a configured set of providers that carry a
/// `lineage.inputs` array, and turns each entry into an input dataset.
#[derive(Debug, Clone, Default)]
pub struct DeclaredLineageVisitor {
    providers: HashSet<String>,
}

impl DeclaredLineageVisitor {
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            providers: providers
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }

    fn declared_inputs(relation: &RelationRef) -> Option<&Vec<Value>> {
        relation
            .properties
            .get(DECLARED_INPUTS_PROPERTY)
            .and_then(|v| v.as_array())
    }
}

impl ExtensionVisitor for DeclaredLineageVisitor {
    fn name(&self) -> &str {
        "DeclaredLineageVisitor"
    }

    fn is_defined_at(&self, relation: &RelationRef) -> bool {
        let provider_known = relation
            .provider
            .as_deref()
            .map(|p| self.providers.contains(&p.to_lowercase()))
            .unwrap_or(false);

        provider_known && Self::declared_inputs(relation).is_some()
    }

    fn apply(
        &self,
        relation: &RelationRef,
        context: &ExtractionContext,
    ) -> Result<Vec<Dataset>, ExtractError> {
        let declared = match Self::declared_inputs(relation) {
            Some(declared) => declared,
            None => return Ok(Vec::new()),
        };

        // The wrapping table becomes a symlink on every declared input.
        let wrapper = relation.identifier();
        let producer = context.producer();

        declared
            .iter()
            .map(|entry| {
                let input: DeclaredInput =
                    serde_json::from_value(entry.clone()).map_err(|e| ExtractError::DelegateFailed {
                        delegate: self.name().to_string(),
                        reason: format!("invalid {} entry: {}", DECLARED_INPUTS_PROPERTY, e),
                    })?;
                let identifier = DatasetIdentifier::new(input.namespace, input.name);

                let composer = context.composer().add(
                    facets::DATA_SOURCE_FACET,
                    facets::data_source_facet(producer, &identifier.namespace, &identifier.namespace),
                );
                let composer = match &wrapper {
                    Some(wrapper) => composer.add(
                        facets::SYMLINKS_FACET,
                        facets::symlinks_facet(
                            producer,
                            &[(wrapper.namespace.clone(), wrapper.name.clone(), "VIEW".to_string())],
                        ),
                    ),
                    None => composer,
                };

                Ok(Dataset::input(identifier, composer.build()))
            })
            .collect()
    }
}
