//! Structured error types for liveprof
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every variant here is returned to the immediate caller; nothing is
//! deferred through the event system.

use super::types::TimingId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument { argument: &'static str, reason: &'static str },

    #[error(
        "An outstanding transaction is still inflight in the present context. \
         The new transaction '{name}', category '{category}' cannot be created"
    )]
    TransactionInflight { category: String, name: String },

    #[error(
        "Unable to finish transaction or step '{name}', category '{category}', \
         because some of its child steps haven't finished"
    )]
    UnfinishedChildren { category: String, name: String },

    #[error("Unable to add a child step to {parent}, because it is already finished")]
    ParentFinished { parent: TimingId },

    #[error("There is no transaction in the current context")]
    NoTransaction,

    #[error("Invalid profiler configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn event dispatch thread: {0}")]
    DispatchSpawn(#[source] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ProfilerError {
    /// Returns true for errors caused by misuse of the step/transaction scoping
    /// discipline (as opposed to bad arguments or environment failures)
    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            ProfilerError::TransactionInflight { .. }
                | ProfilerError::UnfinishedChildren { .. }
                | ProfilerError::ParentFinished { .. }
                | ProfilerError::NoTransaction
        )
    }
}
