//! Runtime for dispatching lifecycle events to dataset extractors.
//!
//! This module holds the per-process wiring (context, configuration) and
//! the per-event machinery (plan walker, dispatcher).

pub mod config_loader;
pub mod context;
pub mod dispatcher;
pub mod walker;

// Re-export key types
pub use config_loader::LineageConfig;
pub use context::{ExtractionContext, ExtractionContextBuilder};
pub use dispatcher::{
    DispatchOutcome, DispatchPhase, Dispatcher, ExtractorFailure, FailureStage,
};
pub use walker::{preorder, walk, WalkControl};
