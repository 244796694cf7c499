//! # Planlineage: Dataset Lineage Extraction from Query Plans
//!
//! Planlineage turns the logical plan of a running job into the datasets the
//! job reads and writes. A host engine delivers lifecycle events; a
//! [`Dispatcher`] walks the attached plan tree and hands each node to the
//! first registered [`DatasetExtractor`] that recognizes it.
//!
//! ## Features
//!
//! - **Extractor registry**: ordered, immutable set of extractors, first match wins per node
//! - **Facet composition**: per-facet override or additive merge policies
//! - **Version enrichment**: best-effort resolvers, optionally bounded by a timeout
//! - **Delegation**: extension visitors can take over a subtree and report its lineage
//! - **Failure isolation**: a failing or panicking extractor never aborts the dispatch
//! - **Lineage records**: NDJSON or JSON array output for each dispatch
//!
//! ## Example: Configuration
//!
//! ```yaml
//! facet_policies:
//!   columnLineage: additive
//! resolver_timeout_ms: 250
//! extension_providers: [federated]
//! ```
//!
//! ## Example: Dispatch
//!
//! ```ignore
//! use planlineage::{LifecycleEvent, LineageConfig, PlanNode};
//!
//! let dispatcher = LineageConfig::load_from_file("lineage.yaml")?.build_dispatcher()?;
//! let plan: PlanNode = serde_json::from_str(&plan_json)?;
//!
//! let outcome = dispatcher.dispatch(&LifecycleEvent::start(plan));
//! for dataset in outcome.inputs() {
//!     println!("{}", dataset);
//! }
//! ```

// Core model
pub mod dataset;
pub mod error;
pub mod event;
pub mod facets;
pub mod plan;
pub mod version;

// Extraction contracts and built-in extractors
pub mod extraction;
pub mod extractor_registry;
pub mod extractors;
pub mod resolvers;

// Outbound records
pub mod serialization;

// Dispatch runtime
pub mod runtime;

// Re-export key types
pub use dataset::{Dataset, DatasetIdentifier, DatasetRole, FacetBag};
pub use error::{ConfigError, ExtractError, ResolveError};
pub use event::{EventKind, LifecycleEvent};
pub use extraction::{DatasetExtractor, ExtensionVisitor, Extraction, RelationRef};
pub use extractor_registry::{ExtractorRegistration, ExtractorRegistry};
pub use facets::{FacetComposer, FacetPolicies, MergePolicy};
pub use plan::{NodeKind, PlanNode};
pub use resolvers::{BoundedResolver, PropertyVersionResolver, VersionResolver, VersionToken};
pub use serialization::{JsonArrayWriter, LineageRecord, NdjsonWriter, SerializationError};

// Re-export runtime types
pub use runtime::{
    DispatchOutcome, Dispatcher, ExtractionContext, ExtractorFailure, LineageConfig,
};
