//! Health and readiness supervision

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::warn;

use crate::reconciler::route_table::ReconcileOutcome;

/// Tracks readiness and consecutive pass failures.
///
/// The instance reports ready only after the attribute mutation has been
/// attempted and one pass finished with zero failures. Enough consecutive
/// total-pass failures flip the instance unhealthy so the owning group
/// replaces it; the process itself never exits on failure.
pub struct HealthMonitor {
    failure_threshold: u32,
    reconcile_gated: bool,
    attribute_attempted: AtomicBool,
    first_pass_ok: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl HealthMonitor {
    pub fn new(failure_threshold: u32, reconcile_gated: bool) -> Self {
        Self {
            failure_threshold,
            reconcile_gated,
            attribute_attempted: AtomicBool::new(false),
            first_pass_ok: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn mark_attribute_attempted(&self) {
        self.attribute_attempted.store(true, Ordering::SeqCst);
    }

    /// Record a finished pass.
    ///
    /// A pass where every table failed counts against the failure
    /// threshold; any other pass resets the counter.
    pub fn record_pass(&self, outcomes: &[ReconcileOutcome]) {
        let total_failure = !outcomes.is_empty() && outcomes.iter().all(|o| o.is_failed());
        if total_failure {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                consecutive_failures = failures,
                "Reconciliation pass failed for every table"
            );
            return;
        }

        self.consecutive_failures.store(0, Ordering::SeqCst);
        if outcomes.iter().all(|o| !o.is_failed()) {
            self.first_pass_ok.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.attribute_attempted.load(Ordering::SeqCst)
            && (!self.reconcile_gated || self.first_pass_ok.load(Ordering::SeqCst))
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::SeqCst) < self.failure_threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}
