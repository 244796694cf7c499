//! Lifecycle events delivered by the host engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::PlanNode;

/// Coarse classification of a host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A job or query started.
    Start,
    /// A job or query ended.
    End,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Start => write!(f, "start"),
            EventKind::End => write!(f, "end"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(EventKind::Start),
            "end" | "complete" => Ok(EventKind::End),
            other => Err(format!("Unknown event kind: {}", other)),
        }
    }
}

/// A host lifecycle event, optionally carrying the plan it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    #[serde(default)]
    pub plan: Option<PlanNode>,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind, plan: Option<PlanNode>) -> Self {
        Self {
            kind,
            plan,
            occurred_at: Utc::now(),
        }
    }

    pub fn start(plan: PlanNode) -> Self {
        Self::new(EventKind::Start, Some(plan))
    }

    pub fn end(plan: PlanNode) -> Self {
        Self::new(EventKind::End, Some(plan))
    }

    pub fn is_start(&self) -> bool {
        self.kind == EventKind::Start
    }

    pub fn is_end(&self) -> bool {
        self.kind == EventKind::End
    }
}
