//! Lifecycle events fanned out to subscribers
//!
//! Events are built while the owning transaction's lock is held and shared
//! across every subscriber queue behind an `Arc`. Each event remembers the
//! transaction version it was produced at, so a subscriber can reconstruct the
//! tree exactly as it looked at that moment, even if it processes the event
//! much later.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{TimingId, Version};
use crate::snapshot::TransactionSnapshot;
use crate::timing::{Node, TransactionCore};

/// Discriminant of a [`ProfilerEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilerEventType {
    TransactionStart,
    TransactionFinish,
    StepStart,
    StepFinish,
}

impl ProfilerEventType {
    #[must_use]
    pub fn is_start(self) -> bool {
        matches!(self, Self::TransactionStart | Self::StepStart)
    }

    #[must_use]
    pub fn is_transaction(self) -> bool {
        matches!(self, Self::TransactionStart | Self::TransactionFinish)
    }
}

impl fmt::Display for ProfilerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransactionStart => "transaction start",
            Self::TransactionFinish => "transaction finish",
            Self::StepStart => "step start",
            Self::StepFinish => "step finish",
        };
        f.write_str(s)
    }
}

/// Descriptive fields of the timing an event is about
#[derive(Debug, Clone, PartialEq)]
pub struct EventTiming {
    pub id: TimingId,
    pub category: String,
    pub name: String,
    pub display_name: Option<String>,
    pub parameters: Option<JsonValue>,
    pub start: DateTime<Utc>,
}

impl EventTiming {
    pub(crate) fn from_node(node: &Node) -> Self {
        Self {
            id: node.id,
            category: node.category.clone(),
            name: node.name.clone(),
            display_name: node.display_name.clone(),
            parameters: node.parameters.clone(),
            start: node.start,
        }
    }
}

/// Owning transaction and the version the event was produced at
#[derive(Clone)]
pub(crate) struct EventOrigin {
    pub transaction: Arc<TransactionCore>,
    pub version: Version,
}

impl fmt::Debug for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventOrigin")
            .field("transaction", &self.transaction.id())
            .field("version", &self.version)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransactionStartEvent {
    pub timing: EventTiming,
    pub correlation_id: Option<String>,
    pub(crate) origin: EventOrigin,
}

#[derive(Debug, Clone)]
pub struct TransactionFinishEvent {
    pub timing: EventTiming,
    pub correlation_id: Option<String>,
    pub duration: Duration,
    pub is_success: bool,
    pub result: Option<JsonValue>,
    pub(crate) origin: EventOrigin,
}

#[derive(Debug, Clone)]
pub struct StepStartEvent {
    pub timing: EventTiming,
    pub parent_id: TimingId,
    /// Offset of the step's start from the start of its transaction
    pub relative_start: Duration,
    pub(crate) origin: EventOrigin,
}

#[derive(Debug, Clone)]
pub struct StepFinishEvent {
    pub timing: EventTiming,
    pub duration: Duration,
    pub is_success: bool,
    pub result: Option<JsonValue>,
    pub(crate) origin: EventOrigin,
}

#[derive(Debug, Clone)]
pub enum ProfilerEvent {
    TransactionStart(TransactionStartEvent),
    TransactionFinish(TransactionFinishEvent),
    StepStart(StepStartEvent),
    StepFinish(StepFinishEvent),
}

impl ProfilerEvent {
    #[must_use]
    pub fn event_type(&self) -> ProfilerEventType {
        match self {
            Self::TransactionStart(_) => ProfilerEventType::TransactionStart,
            Self::TransactionFinish(_) => ProfilerEventType::TransactionFinish,
            Self::StepStart(_) => ProfilerEventType::StepStart,
            Self::StepFinish(_) => ProfilerEventType::StepFinish,
        }
    }

    #[must_use]
    pub fn timing(&self) -> &EventTiming {
        match self {
            Self::TransactionStart(e) => &e.timing,
            Self::TransactionFinish(e) => &e.timing,
            Self::StepStart(e) => &e.timing,
            Self::StepFinish(e) => &e.timing,
        }
    }

    fn origin(&self) -> &EventOrigin {
        match self {
            Self::TransactionStart(e) => &e.origin,
            Self::TransactionFinish(e) => &e.origin,
            Self::StepStart(e) => &e.origin,
            Self::StepFinish(e) => &e.origin,
        }
    }

    #[must_use]
    pub fn id(&self) -> TimingId {
        self.timing().id
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.timing().category
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.timing().name
    }

    /// Id of the transaction the event belongs to
    #[must_use]
    pub fn transaction_id(&self) -> TimingId {
        self.origin().transaction.id()
    }

    /// Transaction version at which the event was produced
    #[must_use]
    pub fn version(&self) -> Version {
        self.origin().version
    }

    /// Duration and success flag, for finish events only
    #[must_use]
    pub fn outcome(&self) -> Option<(Duration, bool)> {
        match self {
            Self::TransactionFinish(e) => Some((e.duration, e.is_success)),
            Self::StepFinish(e) => Some((e.duration, e.is_success)),
            _ => None,
        }
    }

    /// The owning transaction as it was when this event was produced
    #[must_use]
    pub fn transaction_snapshot(&self) -> TransactionSnapshot {
        let origin = self.origin();
        origin.transaction.snapshot(Some(origin.version))
    }
}

impl fmt::Display for ProfilerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timing = self.timing();
        let label = timing.display_name.as_deref().unwrap_or(&timing.name);
        write!(f, "{} [{}] {}", self.event_type(), timing.category, label)?;
        match self.outcome() {
            Some((duration, success)) => write!(
                f,
                " ({:.2}ms, {})",
                duration.as_secs_f64() * 1000.0,
                if success { "success" } else { "failure" }
            ),
            None => Ok(()),
        }
    }
}
