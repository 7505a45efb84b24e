//! Per-subscriber dispatch loop

use crossbeam_channel::{Receiver, RecvTimeoutError};
use futures::FutureExt;
use log::{debug, error, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use super::{AsyncEventSubscriber, EventSubscriber, Subscriber};
use crate::events::ProfilerEvent;

/// Drive one subscriber until its queue is disconnected and drained
pub(super) fn run(subscriber: Subscriber, events: Receiver<Arc<ProfilerEvent>>, idle_poll: Duration) {
    let name = subscriber.name().to_string();

    let handler = match Handler::new(&subscriber) {
        Ok(handler) => handler,
        Err(e) => {
            error!("Subscriber '{name}' abandoned: failed to build async runtime: {e}");
            return;
        }
    };

    if let Err(e) = guarded(|| subscriber.start()) {
        error!("Subscriber '{name}' abandoned: start failed: {e:#}");
        return;
    }
    debug!("Subscriber '{name}' started");

    let mut delivered = 0usize;
    let mut failed = 0usize;
    loop {
        let event = match events.recv_timeout(idle_poll) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            // Disconnected is only reported once the queue is empty
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let outcome = handler.handle(&event);

        delivered += 1;
        if let Err(e) = outcome {
            failed += 1;
            warn!("Subscriber '{name}' failed to handle {}: {e:#}", event.event_type());
        }
    }

    if let Err(e) = guarded(|| subscriber.stop()) {
        warn!("Subscriber '{name}' failed to stop: {e:#}");
    }
    debug!("Subscriber '{name}' stopped after {delivered} events ({failed} failed)");
}

enum Handler {
    Sync(Arc<dyn EventSubscriber>),
    /// Async handlers are driven on a single-threaded runtime, one at a time
    Async(Arc<dyn AsyncEventSubscriber>, Runtime),
}

impl Handler {
    fn new(subscriber: &Subscriber) -> std::io::Result<Self> {
        Ok(match subscriber {
            Subscriber::Sync(s) => Handler::Sync(Arc::clone(s)),
            Subscriber::Async(s) => Handler::Async(
                Arc::clone(s),
                tokio::runtime::Builder::new_current_thread().enable_all().build()?,
            ),
        })
    }

    fn handle(&self, event: &Arc<ProfilerEvent>) -> anyhow::Result<()> {
        match self {
            Handler::Sync(s) => guarded(|| s.handle_event(event)),
            Handler::Async(s, runtime) => {
                let future = catch_unwind(AssertUnwindSafe(|| s.handle_event(Arc::clone(event))))
                    .map_err(|payload| panic_error(payload.as_ref()))?;
                runtime.block_on(async {
                    match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(result) => result,
                        Err(payload) => Err(panic_error(payload.as_ref())),
                    }
                })
            }
        }
    }
}

/// Run a subscriber hook, turning a panic into an error
fn guarded<R>(hook: impl FnOnce() -> anyhow::Result<R>) -> anyhow::Result<R> {
    catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|payload| Err(panic_error(payload.as_ref())))
}

fn panic_error(payload: &(dyn Any + Send)) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("panicked: {message}")
}
