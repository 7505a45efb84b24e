//! Profiler configuration
//!
//! Defaults match the behaviour expected by most hosts: the 100 most recently
//! started transactions are retained and idle dispatch loops wake every 100ms.
//! Values can be overridden programmatically, deserialized from any serde
//! format, or taken from environment variables via [`ProfilerConfig::from_env`].

use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ProfilerError;

/// Environment variable overriding [`ProfilerConfig::max_recent_transactions`]
pub const ENV_MAX_RECENT_TRANSACTIONS: &str = "LIVEPROF_MAX_RECENT_TRANSACTIONS";
/// Environment variable overriding [`ProfilerConfig::idle_poll_interval_ms`]
pub const ENV_IDLE_POLL_MS: &str = "LIVEPROF_IDLE_POLL_MS";

const DEFAULT_MAX_RECENT_TRANSACTIONS: usize = 100;
const DEFAULT_IDLE_POLL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfilerConfig {
    /// Hard cap on the recent-transactions ring
    pub max_recent_transactions: usize,
    /// How long an idle dispatch loop waits before re-checking its queue
    pub idle_poll_interval_ms: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_recent_transactions: DEFAULT_MAX_RECENT_TRANSACTIONS,
            idle_poll_interval_ms: DEFAULT_IDLE_POLL_MS,
        }
    }
}

impl ProfilerConfig {
    /// Set the recent-transactions cap
    #[must_use]
    pub fn with_max_recent_transactions(mut self, cap: usize) -> Self {
        self.max_recent_transactions = cap;
        self
    }

    /// Set the idle poll interval of dispatch loops
    #[must_use]
    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Idle poll interval as a [`Duration`]
    #[must_use]
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    /// Defaults, overridden by `LIVEPROF_*` environment variables when present.
    ///
    /// Unparseable values are ignored with a warning rather than rejected, so a
    /// typo in the environment never prevents the host from starting.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(cap) = read_env(ENV_MAX_RECENT_TRANSACTIONS) {
            config.max_recent_transactions = cap;
        }
        if let Some(ms) = read_env(ENV_IDLE_POLL_MS) {
            config.idle_poll_interval_ms = ms;
        }
        config
    }

    /// Check the configuration for values the profiler cannot work with
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the ring cap or the poll interval is zero
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.max_recent_transactions == 0 {
            return Err(ProfilerError::InvalidConfig(
                "max_recent_transactions must be at least 1".to_string(),
            ));
        }
        if self.idle_poll_interval_ms == 0 {
            return Err(ProfilerError::InvalidConfig(
                "idle_poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}
