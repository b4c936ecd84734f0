//! Backend target pool with snapshot-swapped health state

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Probe bookkeeping for one target
#[derive(Debug, Clone)]
pub struct ProbeState {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl Default for ProbeState {
    fn default() -> Self {
        Self {
            healthy: true, // Assume healthy until proven otherwise
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

/// View of a target for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub addr: String,
    pub healthy: bool,
    pub active_connections: usize,
}

/// Backend targets for one listener.
///
/// The healthy subset is published as an immutable snapshot that is
/// swapped whole on every health transition; forwarding decisions read a
/// consistent set and established sessions are never evicted by a swap.
pub struct TargetPool {
    targets: Vec<SocketAddr>,
    probe_state: DashMap<SocketAddr, ProbeState>,
    snapshot: RwLock<Arc<Vec<SocketAddr>>>,
    inflight: DashMap<SocketAddr, Arc<AtomicUsize>>,
    failure_threshold: u32,
    recovery_threshold: u32,
}

impl TargetPool {
    pub fn new(targets: Vec<SocketAddr>, failure_threshold: u32, recovery_threshold: u32) -> Self {
        let snapshot = Arc::new(targets.clone());
        Self {
            targets,
            probe_state: DashMap::new(),
            snapshot: RwLock::new(snapshot),
            inflight: DashMap::new(),
            failure_threshold,
            recovery_threshold,
        }
    }

    /// All configured targets, regardless of health
    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    /// Healthy targets as an immutable snapshot
    pub fn healthy_snapshot(&self) -> Arc<Vec<SocketAddr>> {
        self.snapshot.read().clone()
    }

    /// Record one probe result; swaps the snapshot on a health transition
    pub fn record_probe(&self, addr: SocketAddr, success: bool) {
        let mut transition = false;
        {
            let mut state = self.probe_state.entry(addr).or_default();
            if success {
                state.consecutive_failures = 0;
                state.consecutive_successes += 1;

                if !state.healthy && state.consecutive_successes >= self.recovery_threshold {
                    state.healthy = true;
                    transition = true;
                    info!(backend = %addr, "Backend recovered and marked healthy");
                }
            } else {
                state.consecutive_successes = 0;
                state.consecutive_failures += 1;

                if state.healthy && state.consecutive_failures >= self.failure_threshold {
                    state.healthy = false;
                    transition = true;
                    warn!(
                        backend = %addr,
                        failures = state.consecutive_failures,
                        "Backend marked unhealthy after consecutive failures"
                    );
                }
            }
        }

        if transition {
            self.rebuild_snapshot();
        }
    }

    fn rebuild_snapshot(&self) {
        let healthy: Vec<SocketAddr> = self
            .targets
            .iter()
            .filter(|addr| self.is_healthy(**addr))
            .copied()
            .collect();
        *self.snapshot.write() = Arc::new(healthy);
    }

    pub fn is_healthy(&self, addr: SocketAddr) -> bool {
        self.probe_state
            .get(&addr)
            .map(|s| s.healthy)
            .unwrap_or(true) // Assume healthy if not probed yet
    }

    /// Track one forwarded connection for least-connections selection
    pub fn connection_guard(&self, addr: SocketAddr) -> ConnectionGuard {
        let counter = self
            .inflight
            .entry(addr)
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone();
        counter.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard { counter }
    }

    pub fn active_connections(&self, addr: SocketAddr) -> usize {
        self.inflight
            .get(&addr)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn statuses(&self) -> Vec<TargetStatus> {
        self.targets
            .iter()
            .map(|addr| TargetStatus {
                addr: addr.to_string(),
                healthy: self.is_healthy(*addr),
                active_connections: self.active_connections(*addr),
            })
            .collect()
    }
}

/// Decrements the in-flight count when the connection finishes
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
