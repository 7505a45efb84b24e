//! # liveprof - Live Hierarchical Transaction Profiler
//!
//! liveprof is an in-process profiler for services: code marks *transactions*
//! (top-level units of work such as a request) and *steps* (nested
//! sub-operations), and the profiler tracks their timing, outcome and nesting.
//! Point-in-time snapshots of any transaction tree can be taken while it is
//! still running, and lifecycle events are fanned out to subscribers without
//! ever blocking the instrumented code.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Instrumented Code                           │
//! │          (sync functions, async tasks, OS threads)              │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ transaction() / step() / success()
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Profiler (façade)                           │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Context    │──▶│ Timing tree  │──▶│   Recent     │         │
//! │  │    store     │   │ (per-tx lock)│   │ transactions │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │ events (under the tx lock)         │
//! │                            ▼                                    │
//! │  ┌──────────────────────────────────────────────────────┐       │
//! │  │  Dispatch: one queue + one thread per subscriber     │       │
//! │  └──────────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profiler`]: [`Profiler`] façade, step and transaction options, [`global`]
//! - [`context`]: which timing is current in each logical execution context,
//!   and how it propagates to tasks and threads
//! - [`timing`]: per-transaction node arena and the public [`Timing`] handle
//! - [`snapshot`]: immutable, serializable views of transaction trees
//! - [`events`]: [`ProfilerEvent`] and its variants
//! - [`dispatch`]: subscriber traits and the per-subscriber dispatch loop
//! - [`subscribers`]: built-in logging and statistics subscribers
//! - [`naming`]: stable timing names derived from types
//! - [`config`]: [`ProfilerConfig`] with environment overrides
//! - [`domain`]: identifiers, states and [`ProfilerError`]
//! - [`cli`] / [`workload`]: the demo binary's arguments and synthetic workload
//!
//! ## Typical Usage
//!
//! ```
//! use liveprof::{Profiler, TransactionOptions};
//!
//! # fn main() -> Result<(), liveprof::ProfilerError> {
//! let profiler = Profiler::default();
//!
//! let request = profiler.transaction_with(
//!     "HTTP",
//!     "GET /orders/{id}",
//!     TransactionOptions::new().correlation_id("req-42"),
//! )?;
//! let lookup = profiler.step("DB", "load order")?;
//!
//! // Snapshots can be taken at any time, also while work is inflight
//! let live = lookup.transaction_snapshot()?;
//! assert_eq!(live.steps().len(), 1);
//!
//! lookup.success()?;
//! request.success()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! - **Current timing**: the innermost unfinished transaction or step of the
//!   running logical context; new steps attach below it
//! - **Version**: per-transaction counter bumped on every attach and finish;
//!   events remember theirs so the tree can be replayed as of that moment
//! - **Inert handle**: what `step()` returns when nothing is being profiled;
//!   all its operations are no-ops

pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod domain;
pub mod events;
pub mod naming;
pub mod profiler;
pub mod snapshot;
pub mod subscribers;
pub mod timing;
pub mod workload;

pub use config::ProfilerConfig;
pub use dispatch::{AsyncEventSubscriber, EventSubscriber};
pub use domain::{ProfilerError, TimingId, TimingType, TransactionMode, TransactionState, Version};
pub use events::{EventTiming, ProfilerEvent, ProfilerEventType};
pub use profiler::{global, Profiler, StepOptions, TransactionOptions};
pub use snapshot::{StepSnapshot, TimingSnapshot, TransactionSnapshot};
pub use timing::{ProfilerContext, Timing, TimingInfo};
