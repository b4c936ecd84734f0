//! Backend selection strategies

use rand::Rng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::proxy::targets::TargetPool;

/// Balancing strategy for new connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancingStrategy {
    /// Round-robin distribution
    RoundRobin,
    /// Fewest in-flight connections first
    LeastConnections,
    /// Random selection
    Random,
}

impl Default for BalancingStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl BalancingStrategy {
    /// Parse the configured strategy name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "round_robin" => Some(Self::RoundRobin),
            "least_connections" => Some(Self::LeastConnections),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

/// Picks a backend for each new connection
pub struct Balancer {
    strategy: BalancingStrategy,
    round_robin_index: AtomicUsize,
}

impl Balancer {
    pub fn new(strategy: BalancingStrategy) -> Self {
        Self {
            strategy,
            round_robin_index: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> BalancingStrategy {
        self.strategy
    }

    /// Order the healthy targets for one connection attempt: the preferred
    /// target first, then the remaining healthy targets as retry fallbacks.
    pub fn candidates(&self, pool: &TargetPool, healthy: &[SocketAddr]) -> Vec<SocketAddr> {
        if healthy.is_empty() {
            return Vec::new();
        }

        let start = match self.strategy {
            BalancingStrategy::RoundRobin => {
                self.round_robin_index.fetch_add(1, Ordering::Relaxed) % healthy.len()
            }
            BalancingStrategy::LeastConnections => healthy
                .iter()
                .enumerate()
                .min_by_key(|(_, addr)| pool.active_connections(**addr))
                .map(|(index, _)| index)
                .unwrap_or(0),
            BalancingStrategy::Random => rand::thread_rng().gen_range(0..healthy.len()),
        };

        debug!(
            backend = %healthy[start],
            strategy = ?self.strategy,
            "Selected backend for connection"
        );

        let mut ordered = Vec::with_capacity(healthy.len());
        ordered.extend_from_slice(&healthy[start..]);
        ordered.extend_from_slice(&healthy[..start]);
        ordered
    }

    /// Preferred target for one connection
    pub fn select(&self, pool: &TargetPool, healthy: &[SocketAddr]) -> Option<SocketAddr> {
        self.candidates(pool, healthy).first().copied()
    }
}
