//! Lightweight atomic metrics for the engine: counters for the lifecycle
//! events spec.md names (matches formed, probes run/rejected, games
//! started/ended by reason, cleanup invocations, stager advances, loading
//! gate outcomes) plus an `hdrhistogram`-backed latency tracker reused for
//! measured RTT distributions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Process-wide counters. Every field is an independent `AtomicU64` so
/// incrementing one never takes a lock shared with any other counter.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub connections_registered: AtomicU64,
    pub connections_disconnected: AtomicU64,
    pub connections_reconnected: AtomicU64,
    pub sessions_expired: AtomicU64,

    pub matches_formed: AtomicU64,
    pub waitroom_timeouts: AtomicU64,
    pub matchmaker_rejections_rtt: AtomicU64,

    pub probes_started: AtomicU64,
    pub probes_accepted: AtomicU64,
    pub probes_rejected: AtomicU64,
    pub probes_timed_out: AtomicU64,

    pub games_started: AtomicU64,
    pub games_ended_normal: AtomicU64,
    pub games_ended_partner_lost: AtomicU64,
    pub games_ended_error: AtomicU64,
    pub games_ended_desync: AtomicU64,
    pub cleanup_invocations: AtomicU64,
    pub cleanup_noops: AtomicU64,

    pub stager_advances: AtomicU64,
    pub loading_gate_resolved: AtomicU64,
    pub loading_gate_failed: AtomicU64,
    pub loading_gate_timed_out: AtomicU64,

    pub state_broadcasts_sent: AtomicU64,
    pub player_actions_received: AtomicU64,
    pub player_actions_dropped_late: AtomicU64,
}

impl EngineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match_formed(&self) {
        Self::inc(&self.matches_formed);
    }

    pub fn record_cleanup(&self, was_noop: bool) {
        Self::inc(&self.cleanup_invocations);
        if was_noop {
            Self::inc(&self.cleanup_noops);
        }
    }

    pub fn record_game_ended(&self, reason: crate::error::EndReason) {
        use crate::error::EndReason;
        match reason {
            EndReason::Normal => Self::inc(&self.games_ended_normal),
            EndReason::PartnerLost => Self::inc(&self.games_ended_partner_lost),
            EndReason::Error => Self::inc(&self.games_ended_error),
            EndReason::Desync => Self::inc(&self.games_ended_desync),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_registered: self.connections_registered.load(Ordering::Relaxed),
            matches_formed: self.matches_formed.load(Ordering::Relaxed),
            probes_rejected: self.probes_rejected.load(Ordering::Relaxed),
            games_started: self.games_started.load(Ordering::Relaxed),
            cleanup_invocations: self.cleanup_invocations.load(Ordering::Relaxed),
            cleanup_noops: self.cleanup_noops.load(Ordering::Relaxed),
        }
    }
}

/// A compact, serializable view of the counters above, suitable for a
/// diagnostics endpoint or a test assertion.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub connections_registered: u64,
    pub matches_formed: u64,
    pub probes_rejected: u64,
    pub games_started: u64,
    pub cleanup_invocations: u64,
    pub cleanup_noops: u64,
}

/// Latency distribution tracker, keyed by a free-form operation name
/// (e.g. `"measured_rtt"`, `"probe_rtt"`). Falls back to a coarser
/// histogram rather than panicking if bounded allocation fails.
#[derive(Debug, Clone)]
pub struct ResponseTimeTracker {
    operations: HashMap<String, OperationLatencyHistogram>,
}

const LOWEST_DISCERNIBLE_MICROS: u64 = 1;
const HIGHEST_TRACKABLE_MICROS: u64 = 60_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;
const MICROS_PER_MS: f64 = 1000.0;

#[derive(Debug, Clone)]
struct OperationLatencyHistogram {
    histogram: Option<Histogram<u64>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct OperationLatencyMetrics {
    pub average_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

impl Default for ResponseTimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseTimeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    pub fn add_sample(&mut self, operation: &str, duration: Duration) {
        let histogram = self
            .operations
            .entry(operation.to_string())
            .or_insert_with(OperationLatencyHistogram::new);
        histogram.record(duration_to_micros(duration));
    }

    #[must_use]
    pub fn get_latency_metrics(&self, operation: &str) -> Option<OperationLatencyMetrics> {
        self.operations.get(operation)?.metrics()
    }
}

impl OperationLatencyHistogram {
    fn new() -> Self {
        let histogram = Histogram::new_with_bounds(
            LOWEST_DISCERNIBLE_MICROS,
            HIGHEST_TRACKABLE_MICROS,
            SIGNIFICANT_FIGURES,
        )
        .or_else(|e| {
            tracing::warn!(target: "metrics", error = %e, "falling back to unbounded histogram");
            Histogram::new(2)
        })
        .ok();

        Self { histogram }
    }

    fn record(&mut self, micros: u64) {
        let clamped = micros.min(HIGHEST_TRACKABLE_MICROS);
        if let Some(histogram) = self.histogram.as_mut() {
            if let Err(error) = histogram.record(clamped) {
                tracing::warn!(target: "metrics", %error, "failed to record latency sample");
            }
        }
    }

    fn metrics(&self) -> Option<OperationLatencyMetrics> {
        let histogram = self.histogram.as_ref()?;
        if histogram.is_empty() {
            return None;
        }

        Some(OperationLatencyMetrics {
            average_ms: Some(histogram.mean() / MICROS_PER_MS),
            p50_ms: Some(histogram.value_at_percentile(50.0) as f64 / MICROS_PER_MS),
            p95_ms: Some(histogram.value_at_percentile(95.0) as f64 / MICROS_PER_MS),
            p99_ms: Some(histogram.value_at_percentile(99.0) as f64 / MICROS_PER_MS),
            sample_count: histogram.len(),
        })
    }
}

fn duration_to_micros(duration: Duration) -> u64 {
    duration.as_micros().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EndReason;

    #[test]
    fn counters_increment_independently() {
        let metrics = EngineMetrics::new();
        metrics.record_match_formed();
        metrics.record_match_formed();
        metrics.record_cleanup(false);
        metrics.record_cleanup(true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.matches_formed, 2);
        assert_eq!(snapshot.cleanup_invocations, 2);
        assert_eq!(snapshot.cleanup_noops, 1);
    }

    #[test]
    fn record_game_ended_routes_by_reason() {
        let metrics = EngineMetrics::new();
        metrics.record_game_ended(EndReason::Normal);
        metrics.record_game_ended(EndReason::PartnerLost);
        assert_eq!(metrics.games_ended_normal.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.games_ended_partner_lost.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn response_time_tracker_reports_percentiles() {
        let mut tracker = ResponseTimeTracker::new();
        for sample in 0..200u64 {
            tracker.add_sample("rtt", Duration::from_millis(10 + sample % 5));
        }
        let metrics = tracker.get_latency_metrics("rtt").expect("has samples");
        assert!(metrics.average_ms.unwrap() > 0.0);
        assert_eq!(metrics.sample_count, 200);
    }

    #[test]
    fn response_time_tracker_unknown_operation_is_none() {
        let tracker = ResponseTimeTracker::new();
        assert!(tracker.get_latency_metrics("missing").is_none());
    }
}
