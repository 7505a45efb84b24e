//! Shared helpers for integration tests

#![allow(dead_code)]

use futures::future::BoxFuture;
use liveprof::{AsyncEventSubscriber, EventSubscriber, ProfilerEvent, ProfilerEventType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assert `actual` is within `tolerance` of `expected`
pub fn assert_close(actual: Duration, expected: Duration, tolerance: Duration, what: &str) {
    let diff = if actual > expected { actual - expected } else { expected - actual };
    assert!(
        diff <= tolerance,
        "{what}: expected {expected:?} +/- {tolerance:?}, got {actual:?}"
    );
}

/// Records every event and counts lifecycle hook calls
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<Arc<ProfilerEvent>>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Arc<ProfilerEvent>> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<ProfilerEventType> {
        self.events().iter().map(|e| e.event_type()).collect()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl EventSubscriber for Recorder {
    fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_event(&self, event: &ProfilerEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(Arc::new(event.clone()));
        Ok(())
    }
}

/// Async counterpart of [`Recorder`]; yields before recording
#[derive(Default)]
pub struct AsyncRecorder {
    pub events: Mutex<Vec<Arc<ProfilerEvent>>>,
    pub stops: AtomicUsize,
}

impl AsyncRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Arc<ProfilerEvent>> {
        self.events.lock().unwrap().clone()
    }
}

impl AsyncEventSubscriber for AsyncRecorder {
    fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_event(&self, event: Arc<ProfilerEvent>) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.events.lock().unwrap().push(event);
            Ok(())
        })
    }
}

/// Fails (or panics) on transaction starts, records everything else
#[derive(Default)]
pub struct Flaky {
    pub panic: bool,
    pub handled: Mutex<Vec<ProfilerEventType>>,
}

impl EventSubscriber for Flaky {
    fn handle_event(&self, event: &ProfilerEvent) -> anyhow::Result<()> {
        if event.event_type() == ProfilerEventType::TransactionStart {
            if self.panic {
                panic!("subscriber blew up");
            }
            anyhow::bail!("subscriber refused the event");
        }
        self.handled.lock().unwrap().push(event.event_type());
        Ok(())
    }
}
