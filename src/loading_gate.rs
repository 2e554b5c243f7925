//! Two-signal loading gate (spec.md §4.8).
//!
//! ```text
//!               screening_result(pass/fail)
//!                         |
//!  experiment_config -----+----> resolve() once both signals are positive
//!    (starts deadline)    |
//!               runtime_loading_complete(ok/error)
//! ```
//! Once resolved, the gate ignores further `experiment_config` events so a
//! reconnect never re-shows the loading screen.

use std::time::Instant;

use crate::error::LoadingGateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Pending,
    Pass,
    Fail,
}

/// Per-connection loading gate state.
#[derive(Debug, Clone)]
pub struct LoadingGate {
    screening: Signal,
    runtime: Signal,
    deadline: Option<Instant>,
    resolved: bool,
}

/// Outcome of a [`LoadingGate::check`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Still waiting on at least one signal and the deadline hasn't
    /// passed yet.
    Pending,
    /// Both signals resolved positively; the stager may emit the first
    /// scene. Only returned once per gate (re-entrancy guard).
    Resolved,
    /// A signal failed, or the deadline passed with the runtime signal
    /// still pending (treated as a timeout failure).
    Failed(LoadingGateError),
}

impl Default for LoadingGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            screening: Signal::Pending,
            runtime: Signal::Pending,
            deadline: None,
            resolved: false,
        }
    }

    /// Starts the deadline on the first `experiment_config`. Re-entrant:
    /// once the gate has resolved, this is a no-op (spec.md: "reconnect
    /// must not re-show the loading screen").
    pub fn start(&mut self, timeout: std::time::Duration) {
        if self.resolved {
            return;
        }
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + timeout);
        }
    }

    pub fn record_screening_result(&mut self, pass: bool) {
        if self.resolved {
            return;
        }
        self.screening = if pass { Signal::Pass } else { Signal::Fail };
    }

    pub fn record_runtime_loading_complete(&mut self, ok: bool) {
        if self.resolved {
            return;
        }
        self.runtime = if ok { Signal::Pass } else { Signal::Fail };
    }

    /// Evaluates the gate's current state. Call after recording any
    /// signal and also periodically to detect deadline expiry.
    pub fn check(&mut self) -> GateOutcome {
        if self.resolved {
            return GateOutcome::Pending;
        }

        if self.screening == Signal::Fail {
            self.resolved = true;
            return GateOutcome::Failed(LoadingGateError::ScreeningFailed(
                "entry screening failed".to_string(),
            ));
        }
        if self.runtime == Signal::Fail {
            self.resolved = true;
            return GateOutcome::Failed(LoadingGateError::RuntimeFailed(
                "runtime reported a loading error".to_string(),
            ));
        }

        if self.screening == Signal::Pass && self.runtime == Signal::Pass {
            self.resolved = true;
            return GateOutcome::Resolved;
        }

        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline && self.runtime == Signal::Pending {
                self.resolved = true;
                let secs = deadline.saturating_duration_since(Instant::now()).as_secs();
                return GateOutcome::Failed(LoadingGateError::Timeout(secs));
            }
        }

        GateOutcome::Pending
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn both_signals_positive_resolves_once() {
        let mut gate = LoadingGate::new();
        gate.start(Duration::from_secs(60));
        gate.record_screening_result(true);
        assert_eq!(gate.check(), GateOutcome::Pending);
        gate.record_runtime_loading_complete(true);
        assert_eq!(gate.check(), GateOutcome::Resolved);
        // Re-checking after resolution never re-fires.
        assert_eq!(gate.check(), GateOutcome::Pending);
    }

    #[test]
    fn screening_failure_is_terminal() {
        let mut gate = LoadingGate::new();
        gate.start(Duration::from_secs(60));
        gate.record_screening_result(false);
        assert!(matches!(gate.check(), GateOutcome::Failed(LoadingGateError::ScreeningFailed(_))));
        gate.record_runtime_loading_complete(true);
        assert_eq!(gate.check(), GateOutcome::Pending);
    }

    #[test]
    fn deadline_expiry_with_runtime_pending_is_timeout() {
        let mut gate = LoadingGate::new();
        gate.start(Duration::from_millis(1));
        gate.record_screening_result(true);
        std::thread::sleep(Duration::from_millis(10));
        assert!(matches!(gate.check(), GateOutcome::Failed(LoadingGateError::Timeout(_))));
    }

    #[test]
    fn re_entrant_start_after_resolution_is_ignored() {
        let mut gate = LoadingGate::new();
        gate.start(Duration::from_secs(60));
        gate.record_screening_result(true);
        gate.record_runtime_loading_complete(true);
        assert_eq!(gate.check(), GateOutcome::Resolved);
        gate.start(Duration::from_millis(1));
        assert!(gate.is_resolved());
    }
}
