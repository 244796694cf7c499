//! Event dispatcher: matches extractors against an event and its plan.
//!
//! Each call to [`Dispatcher::dispatch`] runs one cycle of
//! `Idle → Matching → Walking → Aggregating → Done`:
//!
//! 1. **Matching**: keep the extractors whose `matches_event` accepts the event.
//! 2. **Walking**: visit the plan in pre-order; at each node the first
//!    candidate (in registration order) whose `matches_node` accepts it has
//!    `extract` invoked. A delegated extraction consumes the node's subtree.
//! 3. **Aggregating**: concatenate datasets in traversal order, without
//!    deduplication.
//!
//! Failures (errors or panics) inside an extractor are contained per node and
//! reported through [`DispatchOutcome::failures`]; they never reach the caller.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::dataset::{Dataset, DatasetRole};
use crate::event::{EventKind, LifecycleEvent};
use crate::extraction::{DatasetExtractor, Extraction};
use crate::extractor_registry::{ExtractorRegistration, ExtractorRegistry};
use crate::plan::PlanNode;
use crate::runtime::context::ExtractionContext;
use crate::runtime::walker::{self, WalkControl};

/// Phase of a dispatch cycle, reported in trace logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Matching,
    Walking,
    Aggregating,
    Done,
}

/// Which extractor call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    MatchesEvent,
    MatchesNode,
    Extract,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::MatchesEvent => write!(f, "matches_event"),
            FailureStage::MatchesNode => write!(f, "matches_node"),
            FailureStage::Extract => write!(f, "extract"),
        }
    }
}

/// A contained extractor failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorFailure {
    pub extractor: String,
    /// Kind of the node being processed; `None` for event-level failures.
    pub node_kind: Option<String>,
    pub stage: FailureStage,
    pub message: String,
}

/// Result of one dispatch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    event_kind: EventKind,
    datasets: Vec<Dataset>,
    failures: Vec<ExtractorFailure>,
    nodes_visited: usize,
}

impl DispatchOutcome {
    fn empty(event_kind: EventKind) -> Self {
        Self {
            event_kind,
            datasets: Vec::new(),
            failures: Vec::new(),
            nodes_visited: 0,
        }
    }

    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    /// All datasets, in plan traversal order.
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn into_datasets(self) -> Vec<Dataset> {
        self.datasets
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter().filter(|d| d.role() == DatasetRole::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.iter().filter(|d| d.role() == DatasetRole::Output)
    }

    /// Predicate and extraction failures, in the order they happened.
    pub fn failures(&self) -> &[ExtractorFailure] {
        &self.failures
    }

    /// Number of plan nodes the walker visited.
    pub fn nodes_visited(&self) -> usize {
        self.nodes_visited
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Dispatches lifecycle events against an immutable extractor registry.
///
/// Holds no per-event state, so one dispatcher can serve concurrent events
/// from several threads.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ExtractorRegistry>,
    context: Arc<ExtractionContext>,
}

impl Dispatcher {
    /// # Arguments
    /// * `registry` - Extractors to try, in priority order
    /// * `context` - Shared context handed to every extractor invocation
    pub fn new(registry: Arc<ExtractorRegistry>, context: Arc<ExtractionContext>) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ExtractionContext {
        &self.context
    }

    /// Extract all datasets for one lifecycle event.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use std::sync::Arc;
    /// use planlineage::{Dispatcher, ExtractionContext, ExtractorRegistry, LifecycleEvent};
    /// use planlineage::extractors::default_extractors;
    ///
    /// let dispatcher = Dispatcher::new(
    ///     Arc::new(ExtractorRegistry::new(default_extractors())),
    ///     Arc::new(ExtractionContext::empty()),
    /// );
    /// let outcome = dispatcher.dispatch(&LifecycleEvent::start(plan));
    /// for dataset in outcome.inputs() {
    ///     println!("read {}", dataset.identifier());
    /// }
    /// ```
    pub fn dispatch(&self, event: &LifecycleEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::empty(event.kind);
        trace_phase(DispatchPhase::Idle, event.kind);

        trace_phase(DispatchPhase::Matching, event.kind);
        let candidates = self.match_event(event, &mut outcome.failures);
        if candidates.is_empty() {
            tracing::debug!("No extractor matches {} event", event.kind);
            trace_phase(DispatchPhase::Done, event.kind);
            return outcome;
        }

        let root = match event.plan.as_ref() {
            Some(root) => root,
            None => {
                tracing::debug!("{} event carries no plan", event.kind);
                trace_phase(DispatchPhase::Done, event.kind);
                return outcome;
            }
        };

        trace_phase(DispatchPhase::Walking, event.kind);
        let mut per_node: Vec<Vec<Dataset>> = Vec::new();
        let mut visited = 0;
        walker::walk(root, |node| {
            visited += 1;
            match self.extract_node(&candidates, node, &mut outcome.failures) {
                Some(extraction) => {
                    let control = if extraction.consumes_subtree() {
                        WalkControl::SkipChildren
                    } else {
                        WalkControl::Descend
                    };
                    per_node.push(extraction.into_datasets());
                    control
                }
                None => WalkControl::Descend,
            }
        });
        outcome.nodes_visited = visited;

        trace_phase(DispatchPhase::Aggregating, event.kind);
        outcome.datasets = per_node.into_iter().flatten().collect();

        tracing::debug!(
            "Dispatched {} event: {} nodes visited, {} datasets, {} failures",
            event.kind,
            outcome.nodes_visited,
            outcome.datasets.len(),
            outcome.failures.len()
        );
        trace_phase(DispatchPhase::Done, event.kind);
        outcome
    }

    fn match_event<'r>(
        &'r self,
        event: &LifecycleEvent,
        failures: &mut Vec<ExtractorFailure>,
    ) -> Vec<&'r ExtractorRegistration> {
        self.registry
            .iter()
            .filter(|registration| {
                let extractor = registration.extractor();
                match guarded(|| extractor.matches_event(event)) {
                    Ok(matched) => matched,
                    Err(message) => {
                        record_failure(failures, extractor, None, FailureStage::MatchesEvent, message);
                        false
                    }
                }
            })
            .collect()
    }

    /// Run the first matching candidate on `node`.
    ///
    /// Returns `None` if no candidate matched. A matched extractor that fails
    /// yields an empty extraction: the node counts as handled.
    fn extract_node(
        &self,
        candidates: &[&ExtractorRegistration],
        node: &PlanNode,
        failures: &mut Vec<ExtractorFailure>,
    ) -> Option<Extraction> {
        for registration in candidates {
            let extractor = registration.extractor();

            match guarded(|| extractor.matches_node(node)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(message) => {
                    record_failure(failures, extractor, Some(node), FailureStage::MatchesNode, message);
                    continue;
                }
            }

            tracing::trace!("Extractor '{}' matched {} node", extractor.name(), node.kind());

            let extraction = match guarded(|| extractor.extract(node, &self.context)) {
                Ok(Ok(extraction)) => extraction,
                Ok(Err(err)) => {
                    record_failure(failures, extractor, Some(node), FailureStage::Extract, err.to_string());
                    Extraction::empty()
                }
                Err(message) => {
                    record_failure(failures, extractor, Some(node), FailureStage::Extract, message);
                    Extraction::empty()
                }
            };
            return Some(extraction);
        }

        None
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("context", &self.context)
            .finish()
    }
}

fn trace_phase(phase: DispatchPhase, kind: EventKind) {
    tracing::trace!(?phase, event = %kind, "dispatch phase");
}

/// Run `f`, converting a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn record_failure(
    failures: &mut Vec<ExtractorFailure>,
    extractor: &dyn DatasetExtractor,
    node: Option<&PlanNode>,
    stage: FailureStage,
    message: String,
) {
    let node_kind = node.map(|n| n.kind().to_string());
    tracing::warn!(
        "Extractor '{}' failed in {} on {} node: {}",
        extractor.name(),
        stage,
        node_kind.as_deref().unwrap_or("<event>"),
        message
    );
    failures.push(ExtractorFailure {
        extractor: extractor.name().to_string(),
        node_kind,
        stage,
        message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetIdentifier, FacetBag};
    use crate::error::ExtractError;
    use crate::plan::NodeKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits one input named after the node's `label` for every node of `kind`.
    struct Labeling {
        name: &'static str,
        kind: NodeKind,
        on: EventKind,
        calls: AtomicUsize,
    }

    impl Labeling {
        fn new(name: &'static str, kind: NodeKind, on: EventKind) -> Self {
            Self {
                name,
                kind,
                on,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DatasetExtractor for Labeling {
        fn name(&self) -> &str {
            self.name
        }

        fn matches_event(&self, event: &LifecycleEvent) -> bool {
            event.kind == self.on
        }

        fn matches_node(&self, node: &PlanNode) -> bool {
            node.kind() == &self.kind
        }

        fn extract(
            &self,
            node: &PlanNode,
            _context: &ExtractionContext,
        ) -> Result<Extraction, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let label = node.str_property("label").unwrap_or("?");
            Ok(Extraction::Datasets(vec![Dataset::input(
                DatasetIdentifier::new(self.name, label),
                FacetBag::new(),
            )]))
        }
    }

    fn leaf(label: &str) -> PlanNode {
        PlanNode::new(NodeKind::Relation).with_property("label", serde_json::json!(label))
    }

    fn dispatcher(extractors: Vec<Arc<dyn DatasetExtractor>>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(ExtractorRegistry::new(extractors)),
            Arc::new(ExtractionContext::builder().producer("urn:test").build()),
        )
    }

    fn names(outcome: &DispatchOutcome) -> Vec<String> {
        outcome.datasets().iter().map(|d| d.identifier().to_string()).collect()
    }

    #[test]
    fn test_event_filter_prevents_extract() {
        let end_only = Arc::new(Labeling::new("end", NodeKind::Relation, EventKind::End));
        let d = dispatcher(vec![end_only.clone()]);

        let outcome = d.dispatch(&LifecycleEvent::start(leaf("t")));

        assert!(outcome.is_empty());
        assert_eq!(end_only.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.nodes_visited(), 0);
    }

    #[test]
    fn test_first_match_wins() {
        let first = Arc::new(Labeling::new("first", NodeKind::Relation, EventKind::Start));
        let second = Arc::new(Labeling::new("second", NodeKind::Relation, EventKind::Start));
        let d = dispatcher(vec![first.clone(), second.clone()]);

        let outcome = d.dispatch(&LifecycleEvent::start(leaf("t")));

        assert_eq!(names(&outcome), vec!["first/t"]);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_event_without_plan() {
        let d = dispatcher(vec![Arc::new(Labeling::new("x", NodeKind::Relation, EventKind::Start))]);

        let outcome = d.dispatch(&LifecycleEvent::new(EventKind::Start, None));

        assert!(outcome.is_empty());
        assert!(outcome.failures().is_empty());
    }

    #[test]
    fn test_panic_message_extraction() {
        let msg = guarded(|| -> () { panic!("boom") }).unwrap_err();
        assert_eq!(msg, "panicked: boom");

        let msg = guarded(|| -> () { panic!("code {}", 7) }).unwrap_err();
        assert_eq!(msg, "panicked: code 7");
    }
}
