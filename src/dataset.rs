//! Core dataset types for lineage extraction.
//!
//! A [`Dataset`] is what every extractor produces: an identity, a role and a
//! frozen [`FacetBag`] of structured metadata.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a dataset: where it lives and what it is called.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetIdentifier {
    pub namespace: String,
    pub name: String,
}

impl DatasetIdentifier {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DatasetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Whether a computation read or wrote a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetRole {
    Input,
    Output,
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetRole::Input => write!(f, "input"),
            DatasetRole::Output => write!(f, "output"),
        }
    }
}

/// Named facets attached to one dataset.
///
/// Equality ignores insertion order; serialization follows it, so the same
/// sequence of contributions always produces the same JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetBag {
    facets: IndexMap<String, Value>,
}

impl FacetBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.facets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Facet names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.facets.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.facets.iter().map(|(k, v)| (k.as_str(), v))
    }

    // Mutation stays inside the crate: only the composer fills a bag.
    pub(crate) fn entry_mut(&mut self, name: String) -> indexmap::map::Entry<'_, String, Value> {
        self.facets.entry(name)
    }
}

impl IntoIterator for FacetBag {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.facets.into_iter()
    }
}

/// A dataset read or written by a computation, with its facets.
///
/// Immutable once constructed: extractors hand datasets out by value and
/// keep no reference to them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    #[serde(flatten)]
    identifier: DatasetIdentifier,
    #[serde(skip)]
    role: DatasetRole,
    facets: FacetBag,
}

impl Dataset {
    pub fn input(identifier: DatasetIdentifier, facets: FacetBag) -> Self {
        Self {
            identifier,
            role: DatasetRole::Input,
            facets,
        }
    }

    pub fn output(identifier: DatasetIdentifier, facets: FacetBag) -> Self {
        Self {
            identifier,
            role: DatasetRole::Output,
            facets,
        }
    }

    /// Dataset with a role decided at runtime.
    pub fn with_role(role: DatasetRole, identifier: DatasetIdentifier, facets: FacetBag) -> Self {
        Self {
            identifier,
            role,
            facets,
        }
    }

    /// Namespace and name together.
    pub fn identifier(&self) -> &DatasetIdentifier {
        &self.identifier
    }

    pub fn namespace(&self) -> &str {
        &self.identifier.namespace
    }

    pub fn name(&self) -> &str {
        &self.identifier.name
    }

    pub fn role(&self) -> DatasetRole {
        self.role
    }

    pub fn facets(&self) -> &FacetBag {
        &self.facets
    }

    pub fn facet(&self, name: &str) -> Option<&Value> {
        self.facets.get(name)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role(), self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(entries: &[(&str, Value)]) -> FacetBag {
        let mut bag = FacetBag::new();
        for (name, value) in entries {
            bag.entry_mut(name.to_string()).or_insert(value.clone());
        }
        bag
    }

    #[test]
    fn test_facet_bag_equality_ignores_order() {
        let a = bag(&[("schema", json!({"fields": []})), ("version", json!("v1"))]);
        let b = bag(&[("version", json!("v1")), ("schema", json!({"fields": []}))]);

        assert_eq!(a, b);
    }

    #[test]
    fn test_facet_bag_serializes_in_insertion_order() {
        let a = bag(&[("version", json!("v1")), ("schema", json!(1))]);
        let b = bag(&[("schema", json!(1)), ("version", json!("v1"))]);

        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"version":"v1","schema":1}"#);
        assert_eq!(serde_json::to_string(&b).unwrap(), r#"{"schema":1,"version":"v1"}"#);
    }

    #[test]
    fn test_dataset_roles() {
        let id = DatasetIdentifier::new("s3://warehouse", "db.orders");
        let input = Dataset::input(id.clone(), FacetBag::new());
        let output = Dataset::with_role(DatasetRole::Output, id, FacetBag::new());

        assert_eq!(input.role(), DatasetRole::Input);
        assert_eq!(output.role(), DatasetRole::Output);
        assert_eq!(input.to_string(), "input s3://warehouse/db.orders");
    }

    #[test]
    fn test_dataset_serialization_shape() {
        let dataset = Dataset::input(
            DatasetIdentifier::new("ns", "table"),
            bag(&[("version", json!({"datasetVersion": "7"}))]),
        );

        let value = serde_json::to_value(&dataset).unwrap();
        assert_eq!(
            value,
            json!({
                "namespace": "ns",
                "name": "table",
                "facets": {"version": {"datasetVersion": "7"}}
            })
        );
    }
}
