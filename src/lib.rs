//! NAT Relay Agent
//!
//! A self-healing agent that lets a cheap auto-recovering instance stand in
//! for a managed NAT gateway and, in the combined variant, a managed load
//! balancer: it disables the source/destination check, keeps the default
//! routes of its owned route tables pointed at itself, and forwards inbound
//! connections to healthy backend targets.

pub mod admin;
pub mod attribute;
pub mod config;
pub mod error;
pub mod health;
pub mod provider;
pub mod proxy;
pub mod reconciler;

pub use error::{AgentError, Result};

use std::sync::Arc;
use tokio::sync::mpsc;

use health::HealthMonitor;
use proxy::TargetPool;
use reconciler::OutcomeBoard;

/// Application state shared with the admin surface
pub struct AppState {
    pub monitor: Arc<HealthMonitor>,
    pub board: Arc<OutcomeBoard>,
    pub pools: Vec<ListenerPool>,
    /// External reconcile trigger; absent when the reconciler is disabled
    pub reconcile_tx: Option<mpsc::Sender<()>>,
}

/// A forwarding port and its backend pool, for status reporting
pub struct ListenerPool {
    pub port: u16,
    pub pool: Arc<TargetPool>,
}
