//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep identifiers, sequence numbers and versions from
//! being mixed up, and make function signatures more expressive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Unique identifier of a transaction or step (128-bit UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimingId(pub Uuid);

impl TimingId {
    /// Allocate a fresh random identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns true for the all-zero identifier
    #[must_use]
    pub fn is_nil(self) -> bool {
        self.0.is_nil()
    }
}

impl Default for TimingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide creation order of a transaction
///
/// Used to order the recent-transactions list by recency. Steps do not
/// carry a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Sequence(pub u64);

static SEQUENCE_SEED: AtomicU64 = AtomicU64::new(0);

impl Sequence {
    /// Take the next sequence number (monotonic, starts at 1)
    pub fn next() -> Self {
        Self(SEQUENCE_SEED.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Structural version of a transaction tree
///
/// Starts at zero when the transaction is created and is incremented every
/// time a step is attached or any node finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// The version at which every transaction root starts
    pub const INITIAL: Version = Version(0);

    /// The version following this one
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Whether a timing is a transaction root or a nested step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimingType {
    /// The timing is a transaction (no parent)
    Transaction,
    /// The timing is a step within a transaction or another step
    Step,
}

impl fmt::Display for TimingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingType::Transaction => write!(f, "transaction"),
            TimingType::Step => write!(f, "step"),
        }
    }
}

/// Outcome of a transaction or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionState {
    /// Still running
    #[default]
    Inflight,
    /// Completed successfully
    Success,
    /// Completed with failure
    Failure,
}

impl TransactionState {
    /// Returns true once the timing reached a terminal state
    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, TransactionState::Inflight)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Inflight => write!(f, "inflight"),
            TransactionState::Success => write!(f, "success"),
            TransactionState::Failure => write!(f, "failure"),
        }
    }
}

/// How a new transaction relates to whatever is already current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionMode {
    /// Fail if a transaction is already inflight in the current context
    #[default]
    New,
    /// Always start a fresh transaction, displacing the current one
    Replace,
    /// Attach as a step when something is inflight, otherwise start a transaction
    StepOrTransaction,
}
