//! Peer-to-peer latency probe orchestration (spec.md §4.3).
//!
//! `ProbeCoordinator` treats the actual probing mechanism as an opaque
//! oracle behind an `async_trait`, keeping the transport-specific part
//! swappable and the orchestration logic testable without a real network.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

use crate::ids::SubjectId;
use crate::metrics::EngineMetrics;

/// A single probe's result: `None` on timeout.
pub type ProbeResult = Option<u32>;

/// The oracle that actually runs a probe between two subjects and
/// eventually produces a result. In production this is backed by the
/// wire `probe_start`/`probe_report` round trip (SPEC_FULL.md §6.1); in
/// tests it can be a canned responder.
#[async_trait]
pub trait ProbeOracle: Send + Sync {
    /// Starts a probe, identified by `handle`. The oracle is expected to
    /// eventually call back into [`ProbeCoordinator::report_result`] with
    /// the same handle -- this call only kicks the probe off.
    async fn start_probe(&self, handle: Uuid, subject_a: SubjectId, subject_b: SubjectId);
}

struct PendingProbe {
    sender: Option<oneshot::Sender<ProbeResult>>,
}

/// Orchestrates probes: creates them, de-duplicates late/duplicate
/// results by handle, and enforces a timeout.
pub struct ProbeCoordinator {
    oracle: Arc<dyn ProbeOracle>,
    default_timeout: Duration,
    pending: DashMap<Uuid, PendingProbe>,
    metrics: Arc<EngineMetrics>,
}

impl ProbeCoordinator {
    #[must_use]
    pub fn new(oracle: Arc<dyn ProbeOracle>, default_timeout: Duration, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            oracle,
            default_timeout,
            pending: DashMap::new(),
            metrics,
        }
    }

    /// Creates a probe between two subjects and awaits its result (or the
    /// default timeout, spec.md's default 10s). Returns `None` on timeout,
    /// matching `should_reject_for_rtt`'s "missing measurement" case.
    pub async fn create_probe(&self, subject_a: SubjectId, subject_b: SubjectId) -> ProbeResult {
        let handle = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(handle, PendingProbe { sender: Some(tx) });
        self.metrics.probes_started.fetch_add(1, Ordering::Relaxed);

        self.oracle.start_probe(handle, subject_a, subject_b).await;

        let result = match timeout(self.default_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => None,
            Err(_) => {
                self.metrics.probes_timed_out.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        self.pending.remove(&handle);
        result
    }

    /// Delivers a probe result by handle. A handle that's already been
    /// resolved (duplicate or late result after cancel/timeout) is
    /// silently ignored.
    pub fn report_result(&self, handle: Uuid, rtt_ms: Option<u32>) {
        if let Some(mut entry) = self.pending.get_mut(&handle) {
            if let Some(sender) = entry.sender.take() {
                let _ = sender.send(rtt_ms);
            }
        }
    }

    /// Cancels a pending probe, e.g. because a candidate departed before
    /// the result arrived. Idempotent: cancelling twice, or an already-
    /// resolved handle, is a no-op.
    pub fn cancel(&self, handle: Uuid) {
        self.pending.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::EngineMetrics;

    struct ImmediateOracle {
        coordinator: std::sync::Mutex<Option<Arc<ProbeCoordinator>>>,
        result: ProbeResult,
    }

    #[async_trait]
    impl ProbeOracle for ImmediateOracle {
        async fn start_probe(&self, handle: Uuid, _a: SubjectId, _b: SubjectId) {
            let coordinator = self.coordinator.lock().unwrap().clone();
            let result = self.result;
            if let Some(coordinator) = coordinator {
                tokio::spawn(async move {
                    coordinator.report_result(handle, result);
                });
            }
        }
    }

    struct NeverRespondingOracle;

    #[async_trait]
    impl ProbeOracle for NeverRespondingOracle {
        async fn start_probe(&self, _handle: Uuid, _a: SubjectId, _b: SubjectId) {}
    }

    #[tokio::test]
    async fn probe_reports_result() {
        let oracle = Arc::new(ImmediateOracle {
            coordinator: std::sync::Mutex::new(None),
            result: Some(42),
        });
        let metrics = Arc::new(EngineMetrics::new());
        let coordinator = Arc::new(ProbeCoordinator::new(oracle.clone(), Duration::from_secs(5), metrics.clone()));
        *oracle.coordinator.lock().unwrap() = Some(coordinator.clone());

        let result = coordinator.create_probe(SubjectId::new(), SubjectId::new()).await;
        assert_eq!(result, Some(42));
        assert_eq!(metrics.probes_started.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.probes_timed_out.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn probe_timeout_yields_none() {
        let oracle = Arc::new(NeverRespondingOracle);
        let metrics = Arc::new(EngineMetrics::new());
        let coordinator = ProbeCoordinator::new(oracle, Duration::from_millis(20), metrics.clone());
        let result = coordinator.create_probe(SubjectId::new(), SubjectId::new()).await;
        assert_eq!(result, None);
        assert_eq!(metrics.probes_timed_out.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn duplicate_result_after_resolution_is_ignored() {
        let oracle = Arc::new(ImmediateOracle {
            coordinator: std::sync::Mutex::new(None),
            result: Some(10),
        });
        let coordinator = Arc::new(ProbeCoordinator::new(
            oracle.clone(),
            Duration::from_secs(5),
            Arc::new(EngineMetrics::new()),
        ));
        *oracle.coordinator.lock().unwrap() = Some(coordinator.clone());

        let _ = coordinator.create_probe(SubjectId::new(), SubjectId::new()).await;
        // Reporting again on a handle that's already been cleaned up must
        // not panic.
        coordinator.report_result(Uuid::new_v4(), Some(99));
    }
}
