//! Context store: the timing that is "current" for a logical execution context
//!
//! Each logical context owns its own slot. Inside a context scope (a future
//! wrapped by [`in_current_context`]/[`spawn`], or a closure run through
//! [`ContextSnapshot::run`]) the slot is a tokio task-local; everywhere else it
//! is a thread-local.
//!
//! Propagation is copy-on-fork: [`fork`] captures the caller's current timing
//! and the forked context starts from it, but nothing the forked context sets
//! is ever visible back in the parent. Threads that were not started through
//! [`spawn_thread`] (or that never adopted a snapshot) start with no current
//! timing.
//!
//! ```
//! # async fn example(profiler: liveprof::Profiler) -> Result<(), liveprof::ProfilerError> {
//! let tx = profiler.transaction("jobs", "nightly")?;
//! let child = liveprof::context::spawn({
//!     let profiler = profiler.clone();
//!     async move {
//!         // Inherits `nightly` as the current timing
//!         let step = profiler.step("jobs", "compact")?;
//!         step.success()
//!     }
//! });
//! child.await.expect("task panicked")?;
//! tx.success()?;
//! # Ok(())
//! # }
//! ```
//!
//! Tasks spawned with a bare `tokio::spawn` have no slot at all: they never see
//! the worker thread's timing and nothing they set is kept, so their steps are
//! inert. Instrumented async code should be spawned through [`spawn`] or
//! wrapped with [`in_current_context`].

use std::cell::RefCell;
use std::future::Future;

use crate::timing::TimingRef;

tokio::task_local! {
    static TASK_CURRENT: RefCell<Option<TimingRef>>;
}

thread_local! {
    static THREAD_CURRENT: RefCell<Option<TimingRef>> = const { RefCell::new(None) };
}

/// Where the current timing of the running code is kept
enum Slot {
    Task,
    Thread,
    /// Polled by a tokio task outside any context scope
    Unscoped,
}

fn slot() -> Slot {
    if TASK_CURRENT.try_with(|_| ()).is_ok() {
        Slot::Task
    } else if tokio::task::try_id().is_some() {
        // The worker thread's slot belongs to whatever else it polls
        Slot::Unscoped
    } else {
        Slot::Thread
    }
}

/// The timing current in this logical context, if any
pub(crate) fn current() -> Option<TimingRef> {
    match slot() {
        Slot::Task => TASK_CURRENT.with(|cell| cell.borrow().clone()),
        Slot::Thread => THREAD_CURRENT.with(|cell| cell.borrow().clone()),
        Slot::Unscoped => None,
    }
}

/// Replace the current timing of this logical context only
pub(crate) fn set_current(timing: Option<TimingRef>) {
    match slot() {
        Slot::Task => TASK_CURRENT.with(|cell| *cell.borrow_mut() = timing),
        Slot::Thread => THREAD_CURRENT.with(|cell| *cell.borrow_mut() = timing),
        Slot::Unscoped => {}
    }
}

/// Forget the current timing of this logical context
pub fn clear() {
    set_current(None);
}

/// Returns true if this logical context currently has a timing
pub fn has_current() -> bool {
    current().is_some()
}

/// A captured copy of the caller's current timing, ready to seed a child context
#[derive(Clone, Default)]
pub struct ContextSnapshot {
    timing: Option<TimingRef>,
}

impl std::fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("has_timing", &self.timing.is_some())
            .finish()
    }
}

impl ContextSnapshot {
    /// A snapshot with no current timing, for work that must start detached
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the snapshot carries no timing
    pub fn is_empty(&self) -> bool {
        self.timing.is_none()
    }

    /// Run `fut` in a child context seeded from this snapshot
    pub fn scope<F: Future>(self, fut: F) -> impl Future<Output = F::Output> {
        TASK_CURRENT.scope(RefCell::new(self.timing), fut)
    }

    /// Run `f` synchronously in a child context seeded from this snapshot
    ///
    /// Works on any thread, including threads that have never seen a timing.
    pub fn run<R>(self, f: impl FnOnce() -> R) -> R {
        TASK_CURRENT.sync_scope(RefCell::new(self.timing), f)
    }
}

/// Capture the caller's current timing
pub fn fork() -> ContextSnapshot {
    ContextSnapshot { timing: current() }
}

/// Wrap `fut` so it runs in a child context inheriting the caller's current timing
pub fn in_current_context<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    fork().scope(fut)
}

/// `tokio::spawn` a future in a child context inheriting the caller's current timing
pub fn spawn<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(in_current_context(fut))
}

/// Spawn an OS thread that adopts the caller's current timing
pub fn spawn_thread<F, R>(f: F) -> std::thread::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let snapshot = fork();
    std::thread::spawn(move || snapshot.run(f))
}
