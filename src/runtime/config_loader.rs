//! Lineage configuration loader.
//!
//! Loads the extraction configuration from YAML and assembles the
//! read-only pieces of the engine from it: the extraction context, the
//! extractor registry and the dispatcher.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extraction::DatasetExtractor;
use crate::extractor_registry::ExtractorRegistry;
use crate::extractors::{self, DeclaredLineageVisitor};
use crate::facets::FacetPolicies;
use crate::resolvers::{BoundedResolver, PropertyVersionResolver, VersionResolver};
use crate::runtime::context::ExtractionContext;
use crate::runtime::dispatcher::Dispatcher;
use crate::version;

fn default_version_keys() -> Vec<String> {
    vec![
        "snapshot-id".to_string(),
        "delta.version".to_string(),
        "version".to_string(),
    ]
}

/// Extraction configuration.
///
/// # Example
///
/// ```yaml
/// facet_policies:
///   columnLineage: additive
/// resolver_timeout_ms: 250
/// version_keys: [snapshot-id, delta.version]
/// extension_providers: [federated]
/// disabled_extractors: [RelationInputExtractor]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineageConfig {
    /// Merge policy per facet name (`override` or `additive`).
    #[serde(default)]
    pub facet_policies: FacetPolicies,

    /// Upper bound on each resolver call; unbounded when absent.
    #[serde(default)]
    pub resolver_timeout_ms: Option<u64>,

    /// Table property keys tried, in order, when resolving a dataset version.
    #[serde(default = "default_version_keys")]
    pub version_keys: Vec<String>,

    /// Providers whose tables may declare their own lineage.
    #[serde(default)]
    pub extension_providers: Vec<String>,

    /// Properties file holding the producer version.
    #[serde(default)]
    pub version_file: Option<PathBuf>,

    /// Built-in extractors to leave out of the registry.
    #[serde(default)]
    pub disabled_extractors: Vec<String>,

    /// Collapse repeated dataset identities when writing lineage records.
    #[serde(default)]
    pub deduplicate: bool,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            facet_policies: FacetPolicies::default(),
            resolver_timeout_ms: None,
            version_keys: default_version_keys(),
            extension_providers: Vec::new(),
            version_file: None,
            disabled_extractors: Vec::new(),
            deduplicate: false,
        }
    }
}

impl LineageConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is not valid YAML, or
    /// fails validation.
    ///
    /// # Example
    /// ```ignore
    /// use planlineage::runtime::LineageConfig;
    ///
    /// let config = LineageConfig::load_from_file("config/lineage.yaml")?;
    /// let dispatcher = config.build_dispatcher()?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml_str(&contents)?;
        tracing::info!("Loaded lineage config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "resolver_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if let Some(key) = self.version_keys.iter().find(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "version_keys".to_string(),
                reason: format!("empty key '{}'", key),
            });
        }

        let known: HashSet<String> = extractors::default_extractors()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        if let Some(unknown) = self.disabled_extractors.iter().find(|n| !known.contains(*n)) {
            return Err(ConfigError::Invalid {
                field: "disabled_extractors".to_string(),
                reason: format!("unknown extractor '{}'", unknown),
            });
        }

        Ok(())
    }

    /// Producer URI, from `version_file` if set, else the process-wide one.
    pub fn producer_uri(&self) -> String {
        match &self.version_file {
            Some(path) => version::producer_uri_for(&version::resolve_version_from(path)),
            None => version::producer_uri().to_string(),
        }
    }

    /// Version resolvers described by this config.
    pub fn build_resolvers(&self) -> Result<Vec<Arc<dyn VersionResolver>>, ConfigError> {
        let resolver: Arc<dyn VersionResolver> = Arc::new(PropertyVersionResolver::new(
            "relation",
            self.version_keys.clone(),
        ));

        let resolver = match self.resolver_timeout_ms {
            Some(ms) => {
                let bounded = BoundedResolver::new(resolver, Duration::from_millis(ms)).map_err(
                    |e| ConfigError::Invalid {
                        field: "resolver_timeout_ms".to_string(),
                        reason: format!("cannot start resolver runtime: {}", e),
                    },
                )?;
                Arc::new(bounded) as Arc<dyn VersionResolver>
            }
            None => resolver,
        };

        Ok(vec![resolver])
    }

    /// Build the shared extraction context described by this config.
    ///
    /// # Returns
    /// * `Ok(context)` - Producer URI, merge policies, resolvers and any
    ///   declared-lineage visitor, ready to be wrapped in an `Arc`
    /// * `Err(ConfigError::Invalid)` - The bounded resolver runtime could not
    ///   be started
    pub fn build_context(&self) -> Result<ExtractionContext, ConfigError> {
        let mut builder = ExtractionContext::builder()
            .producer(self.producer_uri())
            .policies(self.facet_policies.clone())
            .resolvers(self.build_resolvers()?);

        if !self.extension_providers.is_empty() {
            builder = builder.extension_visitor(Arc::new(DeclaredLineageVisitor::new(
                self.extension_providers.iter().cloned(),
            )));
        }

        Ok(builder.build())
    }

    /// Built-in extractors minus the disabled ones, in default order.
    pub fn build_registry(&self) -> ExtractorRegistry {
        let enabled: Vec<Arc<dyn DatasetExtractor>> = extractors::default_extractors()
            .into_iter()
            .filter(|e| !self.disabled_extractors.iter().any(|d| d == e.name()))
            .collect();

        ExtractorRegistry::new(enabled)
    }

    /// Registry and context in one dispatcher.
    ///
    /// # Example
    /// ```ignore
    /// use planlineage::{LifecycleEvent, LineageConfig};
    ///
    /// let config = LineageConfig::from_yaml_str("resolver_timeout_ms: 250\n")?;
    /// let dispatcher = config.build_dispatcher()?;
    /// let outcome = dispatcher.dispatch(&LifecycleEvent::start(plan));
    /// ```
    pub fn build_dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        Ok(Dispatcher::new(
            Arc::new(self.build_registry()),
            Arc::new(self.build_context()?),
        ))
    }
}
