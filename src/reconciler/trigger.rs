//! Reconciliation control loop - one task, two wake sources

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::health::HealthMonitor;
use crate::reconciler::route_table::{OutcomeBoard, Reconciler};

/// Drives reconciliation passes from a periodic timer and an external
/// trigger channel.
///
/// A single task owns every pass, so passes for the same table can never
/// interleave.
pub struct ReconcileLoop {
    reconciler: Reconciler,
    monitor: Arc<HealthMonitor>,
    board: Arc<OutcomeBoard>,
    interval: Duration,
    trigger_rx: mpsc::Receiver<()>,
}

impl ReconcileLoop {
    pub fn new(
        reconciler: Reconciler,
        monitor: Arc<HealthMonitor>,
        board: Arc<OutcomeBoard>,
        interval: Duration,
        trigger_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            reconciler,
            monitor,
            board,
            interval,
            trigger_rx,
        }
    }

    /// Run until the shutdown signal flips
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // Converge immediately so a replacement instance repairs routing
        // before the first scheduled tick.
        self.pass("startup").await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so the
        // startup pass is not doubled.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.pass("interval").await,
                Some(()) = self.trigger_rx.recv() => self.pass("external").await,
                _ = shutdown.changed() => {
                    info!("Reconcile loop stopping");
                    break;
                }
            }
        }
    }

    async fn pass(&mut self, trigger: &str) {
        debug!(trigger = trigger, "Starting reconciliation pass");
        let outcomes = self.reconciler.run_pass().await;
        self.monitor.record_pass(&outcomes);
        self.board.publish(outcomes);
    }
}
