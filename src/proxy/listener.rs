//! TCP forwarding listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::proxy::balancer::Balancer;
use crate::proxy::targets::TargetPool;

/// Response sent when every forwarding attempt fails
const BAD_GATEWAY_RESPONSE: &[u8] =
    b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

/// Accepts inbound connections on one port and forwards them to the
/// healthy backend set
pub struct ProxyListener {
    listener: TcpListener,
    pool: Arc<TargetPool>,
    balancer: Arc<Balancer>,
    connect_timeout: Duration,
    retry_limit: u32,
}

impl ProxyListener {
    /// Bind the listening socket
    pub async fn bind(
        addr: SocketAddr,
        pool: Arc<TargetPool>,
        balancer: Arc<Balancer>,
        connect_timeout: Duration,
        retry_limit: u32,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Forwarding listener bound");
        Ok(Self {
            listener,
            pool,
            balancer,
            connect_timeout,
            retry_limit,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until shutdown.
    ///
    /// On shutdown no new connections are accepted; in-flight sessions run
    /// on their own tasks and drain naturally.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((client, peer)) => {
                            let pool = self.pool.clone();
                            let balancer = self.balancer.clone();
                            let connect_timeout = self.connect_timeout;
                            let retry_limit = self.retry_limit;
                            tokio::spawn(async move {
                                forward_connection(
                                    client,
                                    peer,
                                    pool,
                                    balancer,
                                    connect_timeout,
                                    retry_limit,
                                )
                                .await;
                            });
                        }
                        Err(err) => warn!(error = %err, "Failed to accept connection"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Forwarding listener stopping, draining in-flight sessions");
                    break;
                }
            }
        }
    }
}

/// Proxy one client connection to the first reachable healthy backend
async fn forward_connection(
    mut client: TcpStream,
    peer: SocketAddr,
    pool: Arc<TargetPool>,
    balancer: Arc<Balancer>,
    connect_timeout: Duration,
    retry_limit: u32,
) {
    let healthy = pool.healthy_snapshot();
    let candidates = balancer.candidates(&pool, &healthy);
    if candidates.is_empty() {
        debug!(peer = %peer, "No healthy backends for connection");
        let _ = client.write_all(BAD_GATEWAY_RESPONSE).await;
        return;
    }

    let attempts = candidates.len().min(retry_limit as usize + 1);
    for addr in candidates.into_iter().take(attempts) {
        match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut upstream)) => {
                let _guard = pool.connection_guard(addr);
                debug!(peer = %peer, backend = %addr, "Forwarding connection");
                match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                    Ok((to_backend, to_client)) => debug!(
                        peer = %peer,
                        backend = %addr,
                        to_backend,
                        to_client,
                        "Session closed"
                    ),
                    Err(err) => debug!(
                        peer = %peer,
                        backend = %addr,
                        error = %err,
                        "Session ended with error"
                    ),
                }
                return;
            }
            Ok(Err(err)) => {
                warn!(backend = %addr, error = %err, "Backend connect failed, trying next");
            }
            Err(_) => {
                warn!(backend = %addr, "Backend connect timed out, trying next");
            }
        }
    }

    debug!(peer = %peer, "Exhausted backend retries");
    let _ = client.write_all(BAD_GATEWAY_RESPONSE).await;
}
