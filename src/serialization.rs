//! Outbound lineage records and their writers.
//!
//! A [`LineageRecord`] is the serialized view of one dispatch: the event
//! type and time, the producer URI, and the input and output datasets in
//! traversal order. Records are written as NDJSON or as a JSON array.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use crate::dataset::{Dataset, DatasetIdentifier, DatasetRole};
use crate::event::{EventKind, LifecycleEvent};
use crate::facets::{FacetComposer, FacetPolicies};
use crate::runtime::dispatcher::DispatchOutcome;

/// Error type for serialization operations
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Lineage for one lifecycle event, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRecord {
    event_type: &'static str,
    event_time: DateTime<Utc>,
    producer: String,
    inputs: Vec<Dataset>,
    outputs: Vec<Dataset>,
}

fn event_type(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Start => "START",
        EventKind::End => "COMPLETE",
    }
}

impl LineageRecord {
    /// Split a dispatch result into inputs and outputs, keeping their order.
    ///
    /// # Arguments
    /// * `outcome` - Result of one dispatch
    /// * `event_time` - Timestamp written as `eventTime`
    /// * `producer` - Producer URI written as `producer`
    pub fn from_outcome(
        outcome: &DispatchOutcome,
        event_time: DateTime<Utc>,
        producer: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type(outcome.event_kind()),
            event_time,
            producer: producer.into(),
            inputs: outcome.inputs().cloned().collect(),
            outputs: outcome.outputs().cloned().collect(),
        }
    }

    /// Record for `event`, using the event's own timestamp.
    pub fn for_event(
        event: &LifecycleEvent,
        outcome: &DispatchOutcome,
        producer: impl Into<String>,
    ) -> Self {
        Self::from_outcome(outcome, event.occurred_at, producer)
    }

    pub fn event_type(&self) -> &str {
        self.event_type
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        self.event_time
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn inputs(&self) -> &[Dataset] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Dataset] {
        &self.outputs
    }

    /// Collapse datasets sharing an identity within each side.
    ///
    /// The first occurrence keeps its position and facets; facets that only
    /// later duplicates carry are appended to a fresh copy of it.
    pub fn deduplicated(self) -> Self {
        Self {
            inputs: collapse(self.inputs, DatasetRole::Input),
            outputs: collapse(self.outputs, DatasetRole::Output),
            ..self
        }
    }
}

fn collapse(datasets: Vec<Dataset>, role: DatasetRole) -> Vec<Dataset> {
    let before = datasets.len();

    // First occurrence fixes the position of each identity.
    let mut groups: IndexMap<DatasetIdentifier, Vec<Dataset>> = IndexMap::new();
    for dataset in datasets {
        groups
            .entry(dataset.identifier().clone())
            .or_default()
            .push(dataset);
    }

    if groups.len() < before {
        tracing::debug!("Collapsing {} duplicate {} datasets", before - groups.len(), role);
    }

    groups
        .into_iter()
        .filter_map(|(identifier, group)| merge_group(role, identifier, group))
        .collect()
}

fn merge_group(
    role: DatasetRole,
    identifier: DatasetIdentifier,
    group: Vec<Dataset>,
) -> Option<Dataset> {
    let mut group = group.into_iter();
    let first = group.next()?;
    let duplicates: Vec<Dataset> = group.collect();
    if duplicates.is_empty() {
        return Some(first);
    }

    let mut taken: HashSet<String> = first.facets().names().map(str::to_string).collect();
    let mut composer =
        FacetComposer::new(Arc::new(FacetPolicies::new())).extend(first.facets().clone());
    for duplicate in &duplicates {
        for (name, value) in duplicate.facets().iter() {
            if taken.insert(name.to_string()) {
                composer = composer.add(name, value.clone());
            }
        }
    }

    Some(Dataset::with_role(role, identifier, composer.build()))
}

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes records as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single record as an NDJSON line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        Ok(())
    }

    pub fn write_all<T: Serialize>(&mut self, records: &[T]) -> Result<(), SerializationError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
///
/// Writes records as a single JSON array; call [`finish`](Self::finish) to
/// close it.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Create a new JSON array writer and write the opening bracket
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
        })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        let json = serde_json::to_string(record)?;
        write!(self.writer, "{}", json)?;
        Ok(())
    }

    /// Close the bracket and flush
    pub fn finish(mut self) -> Result<(), SerializationError> {
        write!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{DatasetExtractor, Extraction};
    use crate::error::ExtractError;
    use crate::extractor_registry::ExtractorRegistry;
    use crate::facets;
    use crate::plan::PlanNode;
    use crate::runtime::context::ExtractionContext;
    use crate::runtime::dispatcher::Dispatcher;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    /// Emits one dataset per node, named by the node's `table` property.
    struct TableExtractor;

    impl DatasetExtractor for TableExtractor {
        fn name(&self) -> &str {
            "TableExtractor"
        }

        fn matches_event(&self, _event: &LifecycleEvent) -> bool {
            true
        }

        fn matches_node(&self, node: &PlanNode) -> bool {
            node.str_property("table").is_some()
        }

        fn extract(
            &self,
            node: &PlanNode,
            context: &ExtractionContext,
        ) -> Result<Extraction, ExtractError> {
            let table = node.str_property("table").unwrap_or_default();
            let mut composer = context.composer();
            if let Some(format) = node.str_property("format") {
                composer = composer.add(
                    facets::STORAGE_FACET,
                    facets::storage_facet(context.producer(), "hive", Some(format)),
                );
            }
            let identifier = DatasetIdentifier::new("hive://metastore", table);
            let dataset = match node.str_property("role") {
                Some("output") => Dataset::output(identifier, composer.build()),
                _ => Dataset::input(identifier, composer.build()),
            };
            Ok(Extraction::Datasets(vec![dataset]))
        }
    }

    fn dispatch(event: &LifecycleEvent) -> DispatchOutcome {
        let registry = ExtractorRegistry::new(vec![Arc::new(TableExtractor)]);
        let context = ExtractionContext::builder().producer("urn:test").build();
        Dispatcher::new(Arc::new(registry), Arc::new(context)).dispatch(event)
    }

    fn plan() -> PlanNode {
        PlanNode::new("InsertInto")
            .with_property("table", json!("sales.daily"))
            .with_property("role", json!("output"))
            .with_child(
                PlanNode::new("Join")
                    .with_child(PlanNode::new("Scan").with_property("table", json!("sales.orders")))
                    .with_child(
                        PlanNode::new("Scan")
                            .with_property("table", json!("sales.orders"))
                            .with_property("format", json!("orc")),
                    ),
            )
    }

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_record_splits_inputs_and_outputs() {
        let event = LifecycleEvent::end(plan());
        let record = LineageRecord::from_outcome(&dispatch(&event), at_noon(), "urn:test");

        assert_eq!(record.event_type(), "COMPLETE");
        assert_eq!(record.outputs().len(), 1);
        assert_eq!(record.outputs()[0].name(), "sales.daily");
        assert_eq!(record.inputs().len(), 2);
    }

    #[test]
    fn test_record_serialization_shape() {
        let event = LifecycleEvent::start(plan());
        let record = LineageRecord::from_outcome(&dispatch(&event), at_noon(), "urn:test");

        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["eventType"], json!("START"));
        assert_eq!(value["eventTime"], json!("2024-03-01T12:00:00Z"));
        assert_eq!(value["producer"], json!("urn:test"));
        assert_eq!(value["inputs"][0]["namespace"], json!("hive://metastore"));
        assert_eq!(value["outputs"][0]["name"], json!("sales.daily"));
    }

    #[test]
    fn test_deduplicated_keeps_first_and_merges_facets() {
        let event = LifecycleEvent::end(plan());
        let outcome = dispatch(&event);
        let record = LineageRecord::for_event(&event, &outcome, "urn:test");
        assert_eq!(record.inputs().len(), 2);

        let record = record.deduplicated();

        assert_eq!(record.inputs().len(), 1);
        let orders = &record.inputs()[0];
        assert_eq!(orders.name(), "sales.orders");
        assert_eq!(orders.role(), DatasetRole::Input);
        assert!(orders.facets().contains("storage"));
        assert_eq!(orders.facet("storage").unwrap()["fileFormat"], json!("orc"));
        assert_eq!(record.event_time(), event.occurred_at);

        // The extracted datasets themselves are left as they were.
        let first_scan = outcome.inputs().next().unwrap();
        assert!(!first_scan.facets().contains("storage"));
    }

    #[test]
    fn test_ndjson_writer() {
        let event = LifecycleEvent::end(plan());
        let outcome = dispatch(&event);
        let records = vec![
            LineageRecord::from_outcome(&outcome, at_noon(), "urn:a"),
            LineageRecord::from_outcome(&outcome, at_noon(), "urn:b"),
        ];

        let mut buf = Vec::new();
        let mut writer = NdjsonWriter::new(&mut buf);
        writer.write_all(&records).unwrap();
        writer.flush().unwrap();

        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("urn:a"));
        assert!(lines[1].contains("urn:b"));
    }

    #[test]
    fn test_json_array_writer() {
        let event = LifecycleEvent::start(plan());
        let record = LineageRecord::from_outcome(&dispatch(&event), at_noon(), "urn:test");

        let mut buf = Vec::new();
        let mut writer = JsonArrayWriter::new(&mut buf).unwrap();
        writer.write(&record).unwrap();
        writer.write(&record).unwrap();
        writer.finish().unwrap();

        let output = String::from_utf8(buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1]["eventType"], json!("START"));
    }
}
