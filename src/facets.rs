//! Facet composition.
//!
//! Several parties contribute facets to one dataset during a single
//! extraction pass: the structural extractor, then any number of resolvers.
//! [`FacetComposer`] collects those contributions under a per-facet
//! [`MergePolicy`] and is consumed by [`FacetComposer::build`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::dataset::FacetBag;

pub const SCHEMA_FACET: &str = "schema";
pub const DATA_SOURCE_FACET: &str = "dataSource";
pub const VERSION_FACET: &str = "version";
pub const SYMLINKS_FACET: &str = "symlinks";
pub const STORAGE_FACET: &str = "storage";
pub const LIFECYCLE_STATE_CHANGE_FACET: &str = "lifecycleStateChange";

const FACET_SCHEMA_BASE: &str = "https://openlineage.io/spec/facets";

/// How a repeated contribution to the same facet name is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Later contribution replaces the earlier one.
    #[default]
    Override,
    /// Arrays are concatenated and objects shallow-merged (later keys win).
    /// Any other pair of shapes falls back to override.
    Additive,
}

/// Merge policy per facet name. Names without an entry use [`MergePolicy::Override`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetPolicies {
    policies: HashMap<String, MergePolicy>,
}

impl FacetPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, facet: impl Into<String>, policy: MergePolicy) -> Self {
        self.policies.insert(facet.into(), policy);
        self
    }

    pub fn policy_for(&self, facet: &str) -> MergePolicy {
        self.policies.get(facet).copied().unwrap_or_default()
    }

    pub fn from_map(policies: HashMap<String, MergePolicy>) -> Self {
        Self { policies }
    }
}

/// Single-use builder for one dataset's [`FacetBag`].
///
/// The composer is threaded by value through each contribution and consumed
/// by [`build`](Self::build), so a finished bag can never be touched again.
///
/// ```
/// use planlineage::facets::{FacetComposer, FacetPolicies, MergePolicy};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let policies = Arc::new(FacetPolicies::new().with_policy("tags", MergePolicy::Additive));
/// let bag = FacetComposer::new(policies)
///     .add("tags", json!(["pii"]))
///     .add("tags", json!(["gold"]))
///     .build();
///
/// assert_eq!(bag.get("tags"), Some(&json!(["pii", "gold"])));
/// ```
#[derive(Debug, Clone)]
#[must_use = "a composer does nothing until build() is called"]
pub struct FacetComposer {
    policies: Arc<FacetPolicies>,
    bag: FacetBag,
}

impl FacetComposer {
    pub fn new(policies: Arc<FacetPolicies>) -> Self {
        Self {
            policies,
            bag: FacetBag::new(),
        }
    }

    /// Contribute one facet.
    pub fn add(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        let policy = self.policies.policy_for(&name);

        match self.bag.entry_mut(name) {
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            indexmap::map::Entry::Occupied(mut slot) => {
                let merged = match policy {
                    MergePolicy::Override => value,
                    MergePolicy::Additive => merge_additive(slot.get_mut().take(), value),
                };
                *slot.get_mut() = merged;
            }
        }

        self
    }

    /// Contribute an optional facet; `None` leaves the composer untouched.
    pub fn add_optional(self, name: impl Into<String>, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.add(name, value),
            None => self,
        }
    }

    /// Feed every facet of `bag` through the same policies.
    pub fn extend(self, bag: FacetBag) -> Self {
        bag.into_iter().fold(self, |composer, (name, value)| composer.add(name, value))
    }

    /// Finalize the bag.
    pub fn build(self) -> FacetBag {
        self.bag
    }
}

fn merge_additive(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Array(mut left), Value::Array(right)) => {
            left.extend(right);
            Value::Array(left)
        }
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                // Arrays one level down (e.g. symlink identifiers) concatenate.
                let merged = match (left.remove(&key), value) {
                    (Some(Value::Array(mut items)), Value::Array(more)) => {
                        items.extend(more);
                        Value::Array(items)
                    }
                    (_, value) => value,
                };
                left.insert(key, merged);
            }
            Value::Object(left)
        }
        (_, incoming) => incoming,
    }
}

fn stamped(producer: &str, schema: &str, body: Map<String, Value>) -> Value {
    let mut facet = Map::new();
    facet.insert("_producer".to_string(), Value::String(producer.to_string()));
    facet.insert(
        "_schemaURL".to_string(),
        Value::String(format!("{}/{}", FACET_SCHEMA_BASE, schema)),
    );
    facet.extend(body);
    Value::Object(facet)
}

/// One column of a schema facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// `schema` facet from a list of fields.
pub fn schema_facet(producer: &str, fields: &[SchemaField]) -> Value {
    let mut body = Map::new();
    body.insert("fields".to_string(), json!(fields));
    stamped(producer, "1-1-1/SchemaDatasetFacet.json#/$defs/SchemaDatasetFacet", body)
}

/// `dataSource` facet naming the physical location of a dataset.
pub fn data_source_facet(producer: &str, name: &str, uri: &str) -> Value {
    let mut body = Map::new();
    body.insert("name".to_string(), json!(name));
    body.insert("uri".to_string(), json!(uri));
    stamped(
        producer,
        "1-0-1/DatasourceDatasetFacet.json#/$defs/DatasourceDatasetFacet",
        body,
    )
}

/// `version` facet carrying a resolved dataset version.
pub fn version_facet(producer: &str, version: &str) -> Value {
    let mut body = Map::new();
    body.insert("datasetVersion".to_string(), json!(version));
    stamped(
        producer,
        "1-0-1/DatasetVersionDatasetFacet.json#/$defs/DatasetVersionDatasetFacet",
        body,
    )
}

/// `symlinks` facet listing alternative identities of a dataset.
pub fn symlinks_facet(producer: &str, identifiers: &[(String, String, String)]) -> Value {
    let entries: Vec<Value> = identifiers
        .iter()
        .map(|(namespace, name, kind)| json!({"namespace": namespace, "name": name, "type": kind}))
        .collect();
    let mut body = Map::new();
    body.insert("identifiers".to_string(), Value::Array(entries));
    stamped(
        producer,
        "1-0-1/SymlinksDatasetFacet.json#/$defs/SymlinksDatasetFacet",
        body,
    )
}

/// `storage` facet naming the storage layer and file format.
pub fn storage_facet(producer: &str, storage_layer: &str, file_format: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("storageLayer".to_string(), json!(storage_layer));
    if let Some(format) = file_format {
        body.insert("fileFormat".to_string(), json!(format));
    }
    stamped(
        producer,
        "1-0-1/StorageDatasetFacet.json#/$defs/StorageDatasetFacet",
        body,
    )
}

/// `lifecycleStateChange` facet for writes that create, replace or drop a dataset.
pub fn lifecycle_state_change_facet(producer: &str, state: &str) -> Value {
    let mut body = Map::new();
    body.insert("lifecycleStateChange".to_string(), json!(state));
    stamped(
        producer,
        "1-0-1/LifecycleStateChangeDatasetFacet.json#/$defs/LifecycleStateChangeDatasetFacet",
        body,
    )
}
