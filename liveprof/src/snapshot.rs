//! Immutable point-in-time views of a transaction tree
//!
//! Snapshots serialize in camelCase, omit absent optional fields and write
//! durations as fractional milliseconds, which is the shape a JSON endpoint
//! would hand to a browser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::io::Write;
use std::ops::Deref;
use std::time::Duration;

use crate::domain::{ProfilerError, TimingId, TransactionState};

/// Fields shared by transaction and step snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSnapshot {
    pub id: TimingId,
    pub category: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub start: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Duration minus the time spent in child steps
    #[serde(with = "duration_ms")]
    pub own_duration: Duration,
    pub state: TransactionState,
    /// Child steps in creation order; never an empty list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepSnapshot>>,
}

impl TimingSnapshot {
    /// Child steps, empty when there are none
    pub fn steps(&self) -> &[StepSnapshot] {
        self.steps.as_deref().unwrap_or_default()
    }

    /// Number of steps in the whole subtree below this timing
    pub fn descendant_count(&self) -> usize {
        self.steps().iter().map(|s| 1 + s.descendant_count()).sum()
    }

    /// Display name if set, otherwise the name
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSnapshot {
    #[serde(flatten)]
    pub timing: TimingSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Deref for TransactionSnapshot {
    type Target = TimingSnapshot;

    fn deref(&self) -> &Self::Target {
        &self.timing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshot {
    #[serde(flatten)]
    pub timing: TimingSnapshot,
    /// Offset of this step's start from the start of its transaction
    #[serde(with = "duration_ms")]
    pub relative_start: Duration,
}

impl Deref for StepSnapshot {
    type Target = TimingSnapshot;

    fn deref(&self) -> &Self::Target {
        &self.timing
    }
}

/// Write snapshots as a pretty-printed JSON array to any writer
///
/// # Errors
/// Returns `Json` if serialization or the underlying write fails
pub fn write_json<W: Write>(snapshots: &[TransactionSnapshot], writer: W) -> Result<(), ProfilerError> {
    serde_json::to_writer_pretty(writer, snapshots)?;
    Ok(())
}

/// `Duration` as fractional milliseconds
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) mod duration_ms {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    const NANOS_PER_MILLI: f64 = 1_000_000.0;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_nanos() as f64 / NANOS_PER_MILLI)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(de::Error::custom(format!("invalid duration: {ms}ms")));
        }
        Ok(Duration::from_nanos((ms * NANOS_PER_MILLI).round() as u64))
    }
}
