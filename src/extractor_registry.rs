//! Ordered registry of dataset extractors.
//!
//! The registry is fixed at construction: registration order is the
//! tie-break when several extractors recognize the same node, and there is
//! no way to add or remove an extractor afterwards.

use std::fmt;
use std::sync::Arc;

use crate::extraction::DatasetExtractor;

/// One extractor at a fixed position in the registry.
#[derive(Clone)]
pub struct ExtractorRegistration {
    position: usize,
    extractor: Arc<dyn DatasetExtractor>,
}

impl ExtractorRegistration {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn extractor(&self) -> &dyn DatasetExtractor {
        self.extractor.as_ref()
    }

    pub fn name(&self) -> &str {
        self.extractor.name()
    }
}

impl fmt::Debug for ExtractorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistration")
            .field("position", &self.position)
            .field("name", &self.extractor.name())
            .finish()
    }
}

/// Immutable, ordered set of extractors shared by every dispatch.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    registrations: Vec<ExtractorRegistration>,
}

impl ExtractorRegistry {
    /// Build a registry; the order of `extractors` is the registration order.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use planlineage::{ExtractorRegistry, extractors};
    ///
    /// let registry = ExtractorRegistry::new(extractors::default_extractors());
    /// assert!(!registry.is_empty());
    /// ```
    pub fn new(extractors: Vec<Arc<dyn DatasetExtractor>>) -> Self {
        let registrations = extractors
            .into_iter()
            .enumerate()
            .map(|(position, extractor)| ExtractorRegistration {
                position,
                extractor,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Registered {} extractors: {:?}",
            registrations.len(),
            registrations.iter().map(|r| r.name()).collect::<Vec<_>>()
        );

        Self { registrations }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Registrations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ExtractorRegistration> {
        self.registrations.iter()
    }

    /// Check if an extractor with this name is registered
    pub fn has_extractor(&self, name: &str) -> bool {
        self.registrations.iter().any(|r| r.name() == name)
    }

    /// Names of all registered extractors, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.name()).collect()
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
