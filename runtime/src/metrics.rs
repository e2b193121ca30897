//! Table metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! application installs a recorder (e.g. `metrics-exporter-prometheus`).
//!
//! # Metrics
//!
//! - `eventsource_table_messages_total{topic, phase}`
//! - `eventsource_table_batches_total{topic, phase}`
//! - `eventsource_table_highwater_seconds{topic}`
//! - `eventsource_table_highwater_timeouts_total{topic}`
//! - `eventsource_table_failures_total{topic}`
//! - `eventsource_table_cache_entries{topic}`

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Messages consumed.
pub const MESSAGES_TOTAL: &str = "eventsource_table_messages_total";
/// Listener batches dispatched.
pub const BATCHES_TOTAL: &str = "eventsource_table_batches_total";
/// Time from subscribe to highwater.
pub const HIGHWATER_SECONDS: &str = "eventsource_table_highwater_seconds";
/// Highwater timeouts.
pub const HIGHWATER_TIMEOUTS_TOTAL: &str = "eventsource_table_highwater_timeouts_total";
/// Worker failures (consumer, listener or panic).
pub const FAILURES_TOTAL: &str = "eventsource_table_failures_total";
/// Keys in the highwater cache.
pub const CACHE_ENTRIES: &str = "eventsource_table_cache_entries";

/// Register descriptions for every table metric.
///
/// Call once after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(MESSAGES_TOTAL, "Messages consumed, by phase");
    describe_counter!(BATCHES_TOTAL, "Listener batches dispatched, by phase");
    describe_histogram!(
        HIGHWATER_SECONDS,
        metrics::Unit::Seconds,
        "Time from subscribe to reaching the highwater"
    );
    describe_counter!(
        HIGHWATER_TIMEOUTS_TOTAL,
        "Tables that did not reach the highwater in time"
    );
    describe_counter!(FAILURES_TOTAL, "Table workers stopped by an error");
    describe_gauge!(CACHE_ENTRIES, "Keys in the compacted cache at the highwater");
}

/// Consumption phase label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    CatchUp,
    Live,
}

impl Phase {
    pub(crate) const fn from_live(live: bool) -> Self {
        if live { Self::Live } else { Self::CatchUp }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::CatchUp => "catch_up",
            Self::Live => "live",
        }
    }
}

/// Metrics handle labelled with one table's topic.
#[derive(Clone, Debug)]
pub(crate) struct TableMetrics {
    topic: String,
}

impl TableMetrics {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
        }
    }

    pub(crate) fn message(&self, phase: Phase) {
        counter!(MESSAGES_TOTAL, "topic" => self.topic.clone(), "phase" => phase.as_str())
            .increment(1);
    }

    pub(crate) fn batch(&self, phase: Phase) {
        counter!(BATCHES_TOTAL, "topic" => self.topic.clone(), "phase" => phase.as_str())
            .increment(1);
    }

    #[allow(clippy::cast_precision_loss)] // Gauge value; exact above 2^52 is irrelevant
    pub(crate) fn highwater_reached(&self, elapsed: Duration, cache_entries: usize) {
        histogram!(HIGHWATER_SECONDS, "topic" => self.topic.clone()).record(elapsed.as_secs_f64());
        gauge!(CACHE_ENTRIES, "topic" => self.topic.clone()).set(cache_entries as f64);
    }

    pub(crate) fn timeout(&self) {
        counter!(HIGHWATER_TIMEOUTS_TOTAL, "topic" => self.topic.clone()).increment(1);
    }

    pub(crate) fn failure(&self) {
        counter!(FAILURES_TOTAL, "topic" => self.topic.clone()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        describe_metrics();
        let metrics = TableMetrics::new("alarms");
        metrics.message(Phase::CatchUp);
        metrics.batch(Phase::from_live(true));
        metrics.highwater_reached(Duration::from_millis(5), 3);
        metrics.timeout();
        metrics.failure();
    }

    #[test]
    fn phase_labels() {
        assert_eq!(Phase::from_live(false).as_str(), "catch_up");
        assert_eq!(Phase::from_live(true).as_str(), "live");
    }
}
