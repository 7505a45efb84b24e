//! Public timing handle

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::Value as JsonValue;
use std::time::Duration;

use super::TimingRef;
use crate::domain::{ProfilerError, TimingId, TimingType, TransactionState};
use crate::snapshot::TransactionSnapshot;

/// Read-only view of a live timing
#[derive(Debug, Clone, PartialEq)]
pub struct TimingInfo {
    pub timing_type: TimingType,
    pub id: TimingId,
    pub category: String,
    pub name: String,
    pub display_name: Option<String>,
    pub parameters: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub own_duration: Duration,
    pub state: TransactionState,
}

/// What a step predicate gets to look at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilerContext {
    /// The timing current in the caller's context, if any
    pub current_timing: Option<TimingInfo>,
}

/// Handle to a running transaction or step
///
/// Finish it with [`success`](Timing::success), [`success_with`](Timing::success_with)
/// or [`failure`](Timing::failure); dropping an unfinished handle records a
/// success without a result. All finishing calls are idempotent: only the first
/// one counts.
///
/// When profiling is not active (no current transaction, or the step predicate
/// said no) the handle is *inert*: every operation is a no-op and
/// [`transaction_snapshot`](Timing::transaction_snapshot) reports
/// [`ProfilerError::NoTransaction`].
#[must_use = "a timing is finished as soon as it is dropped"]
pub struct Timing {
    inner: Option<TimingRef>,
}

impl Timing {
    pub(crate) fn live(timing: TimingRef) -> Self {
        Self { inner: Some(timing) }
    }

    /// A handle that records nothing
    pub fn inert() -> Self {
        Self { inner: None }
    }

    pub fn is_inert(&self) -> bool {
        self.inner.is_none()
    }

    /// Finish successfully without a result
    ///
    /// # Errors
    /// `UnfinishedChildren` if a child step is still inflight
    pub fn success(&self) -> Result<(), ProfilerError> {
        self.finish(TransactionState::Success, None)
    }

    /// Finish successfully, recording `result`
    ///
    /// # Errors
    /// `UnfinishedChildren` if a child step is still inflight
    pub fn success_with(&self, result: impl Into<JsonValue>) -> Result<(), ProfilerError> {
        self.finish(TransactionState::Success, Some(result.into()))
    }

    /// Finish as failed, recording why
    ///
    /// # Errors
    /// `UnfinishedChildren` if a child step is still inflight
    pub fn failure(&self, result: impl Into<JsonValue>) -> Result<(), ProfilerError> {
        self.finish(TransactionState::Failure, Some(result.into()))
    }

    /// Same as [`success`](Timing::success); what `Drop` does
    ///
    /// # Errors
    /// `UnfinishedChildren` if a child step is still inflight
    pub fn dispose(&self) -> Result<(), ProfilerError> {
        self.success()
    }

    fn finish(&self, state: TransactionState, result: Option<JsonValue>) -> Result<(), ProfilerError> {
        match &self.inner {
            Some(timing) => timing.finish(state, result),
            None => Ok(()),
        }
    }

    /// Latest snapshot of the transaction this timing belongs to
    ///
    /// # Errors
    /// `NoTransaction` for an inert handle
    pub fn transaction_snapshot(&self) -> Result<TransactionSnapshot, ProfilerError> {
        self.inner
            .as_ref()
            .map(TimingRef::transaction_snapshot)
            .ok_or(ProfilerError::NoTransaction)
    }

    /// Current state; an inert handle always reports success
    pub fn state(&self) -> TransactionState {
        self.inner.as_ref().map_or(TransactionState::Success, TimingRef::state)
    }

    pub fn id(&self) -> Option<TimingId> {
        self.inner.as_ref().map(TimingRef::id)
    }

    pub fn timing_type(&self) -> Option<TimingType> {
        self.inner.as_ref().map(TimingRef::timing_type)
    }

    pub fn info(&self) -> Option<TimingInfo> {
        self.inner.as_ref().map(TimingRef::info)
    }
}

impl std::fmt::Debug for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(timing) => f
                .debug_struct("Timing")
                .field("type", &timing.timing_type())
                .field("id", &timing.id())
                .finish(),
            None => f.write_str("Timing(inert)"),
        }
    }
}

impl Drop for Timing {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!("Timing dropped without being finished: {e}");
        }
    }
}
