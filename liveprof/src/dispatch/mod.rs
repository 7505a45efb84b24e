//! # Subscriber Dispatch
//!
//! Every registered subscriber gets a private unbounded queue and a dedicated
//! dispatch thread. Producers push an `Arc<ProfilerEvent>` into each queue and
//! return immediately; the thread hands events to the subscriber one at a
//! time, in enqueue order.
//!
//! ## Failure isolation
//!
//! - `start()` fails → the subscriber is abandoned and never sees an event
//! - `handle_event()` fails or panics → logged, dispatch moves to the next event
//! - `stop()` fails → logged
//!
//! A subscriber that blocks inside `handle_event` stalls its own queue only.

mod registry;
mod worker;

pub(crate) use registry::Registry;

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::events::ProfilerEvent;

/// Receives profiler events on its own dispatch thread
///
/// ```
/// use liveprof::{EventSubscriber, ProfilerEvent};
///
/// struct Printer;
///
/// impl EventSubscriber for Printer {
///     fn handle_event(&self, event: &ProfilerEvent) -> anyhow::Result<()> {
///         println!("{event}");
///         Ok(())
///     }
/// }
/// ```
pub trait EventSubscriber: Send + Sync + 'static {
    /// Called once on the dispatch thread before the first event
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after the queue has drained following unregistration
    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn handle_event(&self, event: &ProfilerEvent) -> anyhow::Result<()>;

    /// Name used in log messages and the dispatch thread's diagnostics
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Async variant of [`EventSubscriber`]
///
/// Handler futures are driven to completion one at a time on a single-threaded
/// runtime owned by the subscriber's dispatch thread, so they may await freely
/// without ever overlapping.
pub trait AsyncEventSubscriber: Send + Sync + 'static {
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn handle_event(&self, event: Arc<ProfilerEvent>) -> BoxFuture<'_, anyhow::Result<()>>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A registered subscriber of either flavour
#[derive(Clone)]
pub(crate) enum Subscriber {
    Sync(Arc<dyn EventSubscriber>),
    Async(Arc<dyn AsyncEventSubscriber>),
}

/// Registration identity: the address of the subscriber's allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SubscriberKey {
    Sync(usize),
    Async(usize),
}

impl SubscriberKey {
    pub fn of_sync<S: EventSubscriber + ?Sized>(subscriber: &Arc<S>) -> Self {
        SubscriberKey::Sync(address(subscriber))
    }

    pub fn of_async<S: AsyncEventSubscriber + ?Sized>(subscriber: &Arc<S>) -> Self {
        SubscriberKey::Async(address(subscriber))
    }
}

fn address<S: ?Sized>(subscriber: &Arc<S>) -> usize {
    Arc::as_ptr(subscriber).cast::<()>() as usize
}

impl Subscriber {
    pub fn key(&self) -> SubscriberKey {
        match self {
            Subscriber::Sync(s) => SubscriberKey::of_sync(s),
            Subscriber::Async(s) => SubscriberKey::of_async(s),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Subscriber::Sync(s) => s.name(),
            Subscriber::Async(s) => s.name(),
        }
    }

    fn start(&self) -> anyhow::Result<()> {
        match self {
            Subscriber::Sync(s) => s.start(),
            Subscriber::Async(s) => s.start(),
        }
    }

    fn stop(&self) -> anyhow::Result<()> {
        match self {
            Subscriber::Sync(s) => s.stop(),
            Subscriber::Async(s) => s.stop(),
        }
    }
}
