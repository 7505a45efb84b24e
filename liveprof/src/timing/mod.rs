//! Transactions and steps
//!
//! A transaction owns an arena with every node of its tree; steps are indices
//! into that arena. One mutex per transaction guards the arena together with
//! its version counter, so unrelated transactions never contend.

mod handle;
mod node;
mod transaction;

pub use handle::{ProfilerContext, Timing, TimingInfo};

pub(crate) use node::{NewTiming, Node};
pub(crate) use transaction::{TimingRef, TransactionCore};
