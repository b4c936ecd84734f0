//! Periodic TCP health probing for backend targets

use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::proxy::targets::TargetPool;

/// Probes every target in a pool on a fixed cadence.
///
/// Runs independently of the forwarding path; a probe transition only
/// changes which targets new connections may select.
pub struct Prober {
    pool: Arc<TargetPool>,
    interval: Duration,
    connect_timeout: Duration,
    probe_task: RwLock<Option<JoinHandle<()>>>,
}

impl Prober {
    pub fn new(pool: Arc<TargetPool>, interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            pool,
            interval,
            connect_timeout,
            probe_task: RwLock::new(None),
        }
    }

    /// Start the probe background task
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) {
        let pool = self.pool.clone();
        let interval = self.interval;
        let connect_timeout = self.connect_timeout;

        let handle = tokio::spawn(async move {
            loop {
                let probes = pool.targets().iter().map(|addr| {
                    let addr = *addr;
                    async move { (addr, probe_once(addr, connect_timeout).await) }
                });

                for (addr, healthy) in join_all(probes).await {
                    debug!(backend = %addr, healthy = healthy, "Probe completed");
                    pool.record_probe(addr, healthy);
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => {
                        info!("Backend prober stopping");
                        return;
                    }
                }
            }
        });

        *self.probe_task.write().await = Some(handle);
        info!(
            interval_secs = self.interval.as_secs(),
            "Started backend prober"
        );
    }

    /// Stop the probe background task
    pub async fn stop(&self) {
        if let Some(handle) = self.probe_task.write().await.take() {
            handle.abort();
            info!("Stopped backend prober");
        }
    }
}

/// A target is reachable if a TCP connect completes within the timeout
async fn probe_once(addr: SocketAddr, connect_timeout: Duration) -> bool {
    matches!(timeout(connect_timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
