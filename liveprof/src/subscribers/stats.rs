//! In-process performance counters
//!
//! Aggregates events as they stream in: how many transactions and steps were
//! started, completed, succeeded and failed, how long they took, and the same
//! broken down per category.
//!
//! ```text
//! transactions  started=120 completed=120 ok=117 failed=3 avg=41.20ms
//! steps         started=960 completed=960 ok=955 failed=5 avg=4.71ms
//! ```
//!
//! # Performance
//!
//! - `handle_event()`: O(1) amortized (map lookup under a short lock)
//! - `slowest_categories()`: O(n log n) where n = unique categories

// Averages intentionally convert counts to f64
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::dispatch::EventSubscriber;
use crate::events::ProfilerEvent;
use crate::snapshot::duration_ms;

// =============================================================================
// COUNTERS (OUTPUT TYPES)
// =============================================================================

/// Counters for one kind of timing (transactions or steps)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    pub started: u64,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Sum of the durations of completed timings
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
}

impl KindStats {
    /// Started but not yet completed
    #[must_use]
    pub fn inflight(&self) -> u64 {
        self.started.saturating_sub(self.completed)
    }

    /// Mean duration of completed timings
    #[must_use]
    pub fn average_duration(&self) -> Option<Duration> {
        u32::try_from(self.completed)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| self.total_duration / n)
    }

    fn record_start(&mut self) {
        self.started += 1;
    }

    fn record_finish(&mut self, duration: Duration, success: bool) {
        self.completed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_duration += duration;
    }
}

impl fmt::Display for KindStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "started={} completed={} ok={} failed={}",
            self.started, self.completed, self.succeeded, self.failed
        )?;
        if let Some(avg) = self.average_duration() {
            write!(f, " avg={:.2}ms", avg.as_secs_f64() * 1000.0)?;
        }
        Ok(())
    }
}

/// Transaction and step counters for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub transactions: KindStats,
    pub steps: KindStats,
}

impl CategoryStats {
    fn kind(&mut self, transaction: bool) -> &mut KindStats {
        if transaction {
            &mut self.transactions
        } else {
            &mut self.steps
        }
    }

    fn record(&mut self, event: &ProfilerEvent) {
        let kind = self.kind(event.event_type().is_transaction());
        match event.outcome() {
            None => kind.record_start(),
            Some((duration, success)) => kind.record_finish(duration, success),
        }
    }

    /// Time spent in completed transactions and steps together
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.transactions.total_duration + self.steps.total_duration
    }
}

/// Everything a [`StatsSubscriber`] has counted so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilerStats {
    #[serde(flatten)]
    pub totals: CategoryStats,
    pub categories: BTreeMap<String, CategoryStats>,
}

impl ProfilerStats {
    /// Categories ordered by total completed duration, slowest first
    #[must_use]
    pub fn slowest_categories(&self, limit: usize) -> Vec<(&str, Duration)> {
        let mut categories: Vec<(&str, Duration)> = self
            .categories
            .iter()
            .map(|(name, stats)| (name.as_str(), stats.total_duration()))
            .collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        categories.truncate(limit);
        categories
    }
}

impl fmt::Display for ProfilerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "transactions  {}", self.totals.transactions)?;
        write!(f, "steps         {}", self.totals.steps)?;
        for (category, stats) in &self.categories {
            let share = if self.totals.total_duration().is_zero() {
                0.0
            } else {
                stats.total_duration().as_secs_f64() / self.totals.total_duration().as_secs_f64() * 100.0
            };
            write!(
                f,
                "\n  {category:<20} tx={:<6} steps={:<6} {share:>5.1}%",
                stats.transactions.completed, stats.steps.completed
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// SUBSCRIBER
// =============================================================================

/// Subscriber that keeps [`ProfilerStats`] up to date
#[derive(Debug, Default)]
pub struct StatsSubscriber {
    stats: Mutex<ProfilerStats>,
}

impl StatsSubscriber {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the counters as of now
    pub fn snapshot(&self) -> ProfilerStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reset(&self) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = ProfilerStats::default();
    }
}

impl EventSubscriber for StatsSubscriber {
    fn handle_event(&self, event: &ProfilerEvent) -> anyhow::Result<()> {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.totals.record(event);
        stats.categories.entry(event.category().to_string()).or_default().record(event);
        Ok(())
    }

    fn name(&self) -> &str {
        "stats"
    }
}
