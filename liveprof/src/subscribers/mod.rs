//! Built-in subscribers
//!
//! - [`LoggingSubscriber`] - writes every event to the `log` facade
//! - [`StatsSubscriber`] - aggregates counters and durations in memory

mod logging;
mod stats;

pub use logging::LoggingSubscriber;
pub use stats::{CategoryStats, KindStats, ProfilerStats, StatsSubscriber};
