//! Headless event display through the `log` facade

use log::{log, log_enabled, Level};

use crate::dispatch::EventSubscriber;
use crate::events::ProfilerEvent;

/// Logs each event at a fixed level under the `liveprof::events` target
#[derive(Debug, Clone)]
pub struct LoggingSubscriber {
    level: Level,
    /// Also log start events, not only finishes
    starts: bool,
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self { level: Level::Info, starts: true }
    }
}

impl LoggingSubscriber {
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level, ..Self::default() }
    }

    /// Only log finish events
    #[must_use]
    pub fn finishes_only(mut self) -> Self {
        self.starts = false;
        self
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn handle_event(&self, event: &ProfilerEvent) -> anyhow::Result<()> {
        if !self.starts && event.event_type().is_start() {
            return Ok(());
        }
        if log_enabled!(target: "liveprof::events", self.level) {
            log!(target: "liveprof::events", self.level, "{event} id={} tx={}", event.id(), event.transaction_id());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
