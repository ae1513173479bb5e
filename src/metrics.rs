//! Prometheus metrics for the sync loop and diff fan-out.
//!
//! This module provides metrics for:
//! - Source fetch latency
//! - Poll cycles and their failures
//! - Per-pair update failures
//! - Published diffs and WebSocket delivery

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Order listing fetch latency metric name.
pub const METRIC_FETCH_LATENCY: &str = "relay_fetch_latency_ms";
/// Poll cycles counter metric name.
pub const METRIC_POLLS: &str = "relay_polls_total";
/// Failed source calls counter metric name.
pub const METRIC_POLL_FAILURES: &str = "relay_poll_failures_total";
/// Skipped pair updates counter metric name.
pub const METRIC_PAIR_UPDATE_FAILURES: &str = "relay_pair_update_failures_total";
/// Published diffs counter metric name.
pub const METRIC_DIFFS_PUBLISHED: &str = "relay_diffs_published_total";
/// Diff messages written to WebSocket clients.
pub const METRIC_WS_MESSAGES_SENT: &str = "relay_ws_messages_sent_total";
/// Diffs dropped for WebSocket clients that fell behind.
pub const METRIC_WS_LAGGED: &str = "relay_ws_lagged_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_FETCH_LATENCY,
        "Order listing fetch latency in milliseconds"
    );

    describe_counter!(METRIC_POLLS, "Total number of poll cycles");
    describe_counter!(
        METRIC_POLL_FAILURES,
        "Total number of failed source calls"
    );
    describe_counter!(
        METRIC_PAIR_UPDATE_FAILURES,
        "Total number of pair updates skipped as malformed"
    );
    describe_counter!(
        METRIC_DIFFS_PUBLISHED,
        "Total number of diffs published"
    );
    describe_counter!(
        METRIC_WS_MESSAGES_SENT,
        "Total number of diff messages sent to WebSocket clients"
    );
    describe_counter!(
        METRIC_WS_LAGGED,
        "Total number of diffs dropped for lagging WebSocket clients"
    );

    debug!("Metrics initialized");
}

/// Increment poll cycles counter.
pub fn inc_polls() {
    counter!(METRIC_POLLS).increment(1);
}

/// Increment failed source calls counter.
pub fn inc_poll_failures() {
    counter!(METRIC_POLL_FAILURES).increment(1);
}

/// Increment skipped pair updates counter.
pub fn inc_pair_update_failures() {
    counter!(METRIC_PAIR_UPDATE_FAILURES).increment(1);
}

/// Increment published diffs counter.
pub fn inc_diffs_published() {
    counter!(METRIC_DIFFS_PUBLISHED).increment(1);
}

/// Increment WebSocket messages sent counter.
pub fn inc_ws_messages_sent() {
    counter!(METRIC_WS_MESSAGES_SENT).increment(1);
}

/// Add diffs skipped by a lagging WebSocket client.
pub fn add_ws_lagged(skipped: u64) {
    counter!(METRIC_WS_LAGGED).increment(skipped);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for order listing fetches.
pub fn timer_fetch() -> LatencyTimer {
    LatencyTimer::new(METRIC_FETCH_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_fetch();
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn counters_without_recorder_are_noops() {
        inc_polls();
        inc_poll_failures();
        add_ws_lagged(3);
    }
}
