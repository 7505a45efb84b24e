//! Subscriber registry and event fan-out

use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{worker, Subscriber, SubscriberKey};
use crate::domain::ProfilerError;
use crate::events::ProfilerEvent;

struct Registration {
    name: String,
    queue: Sender<Arc<ProfilerEvent>>,
    thread: JoinHandle<()>,
}

impl Registration {
    /// Close the queue and wait for the loop to drain it and call `stop()`
    fn shut_down(self) {
        let Registration { name, queue, thread } = self;
        drop(queue);
        // A subscriber unregistering itself from its own handler cannot wait on itself
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            debug!("Dispatch thread of subscriber '{name}' panicked");
        }
    }
}

pub(crate) struct Registry {
    subscribers: RwLock<HashMap<SubscriberKey, Registration>>,
    idle_poll: Duration,
    spawned: AtomicUsize,
}

impl Registry {
    pub fn new(idle_poll: Duration) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            idle_poll,
            spawned: AtomicUsize::new(0),
        }
    }

    /// Start a dispatch loop for `subscriber`.
    ///
    /// Returns `false` if the same subscriber is already registered.
    pub fn register(&self, subscriber: Subscriber) -> Result<bool, ProfilerError> {
        let key = subscriber.key();
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if subscribers.contains_key(&key) {
            return Ok(false);
        }

        let name = subscriber.name().to_string();
        let (queue, events) = unbounded();
        let idle_poll = self.idle_poll;
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let thread = std::thread::Builder::new()
            .name(format!("liveprof-dispatch-{n}"))
            .spawn(move || worker::run(subscriber, events, idle_poll))
            .map_err(ProfilerError::DispatchSpawn)?;

        info!("Registered subscriber '{name}'");
        subscribers.insert(key, Registration { name, queue, thread });
        Ok(true)
    }

    /// Stop the dispatch loop registered under `key` after it drained its queue.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister(&self, key: SubscriberKey) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        // Joined outside the lock: a draining subscriber may take snapshots,
        // which need transaction locks that producers hold while publishing
        match removed {
            Some(registration) => {
                info!("Unregistered subscriber '{}'", registration.name);
                registration.shut_down();
                true
            }
            None => false,
        }
    }

    /// Unregister every subscriber
    pub fn clear(&self) {
        let drained: Vec<Registration> = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, registration)| registration)
            .collect();
        for registration in drained {
            registration.shut_down();
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Enqueue an event for every registered subscriber.
    ///
    /// `make` is only called when at least one subscriber is registered.
    pub fn publish(&self, make: impl FnOnce() -> ProfilerEvent) {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        if subscribers.is_empty() {
            return;
        }

        let event = Arc::new(make());
        for registration in subscribers.values() {
            // Fails only when the loop already exited (abandoned at start)
            if registration.queue.send(Arc::clone(&event)).is_err() {
                debug!("Dropping {} for stopped subscriber '{}'", event.event_type(), registration.name);
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("subscribers", &self.len()).finish()
    }
}
