//! Functional tests for the forwarding proxy

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use nat_relay::proxy::{Balancer, BalancingStrategy, Prober, ProxyListener, TargetPool};

/// Backend that echoes whatever it receives
async fn spawn_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Backend that writes a fixed tag and closes
async fn spawn_tagged_backend(tag: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let _ = socket.write_all(tag).await;
            });
        }
    });
    addr
}

/// A port that was bound once and released, so connects are refused
async fn reserved_dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn start_proxy(pool: Arc<TargetPool>) -> (SocketAddr, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let balancer = Arc::new(Balancer::new(BalancingStrategy::RoundRobin));
    let listener = ProxyListener::bind(
        "127.0.0.1:0".parse().unwrap(),
        pool,
        balancer,
        Duration::from_millis(500),
        1,
    )
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(shutdown_rx));
    (addr, shutdown_tx)
}

#[tokio::test]
async fn test_forwards_bytes_bidirectionally() {
    let backend = spawn_echo_backend().await;
    let pool = Arc::new(TargetPool::new(vec![backend], 3, 2));
    let (proxy_addr, _shutdown) = start_proxy(pool).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_fails_over_to_next_backend() {
    let dead = reserved_dead_addr().await;
    let live = spawn_echo_backend().await;
    let pool = Arc::new(TargetPool::new(vec![dead, live], 3, 2));
    let (proxy_addr, _shutdown) = start_proxy(pool).await;

    // Round-robin tries the dead target first; the bounded retry reaches
    // the live one within the same connection.
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_gateway_error_after_exhausting_retries() {
    let dead = reserved_dead_addr().await;
    let pool = Arc::new(TargetPool::new(vec![dead], 3, 2));
    let (proxy_addr, _shutdown) = start_proxy(pool).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 502"));
}

#[tokio::test]
async fn test_new_connections_avoid_unhealthy_target() {
    let flaky = spawn_tagged_backend(b"A").await;
    let steady = spawn_tagged_backend(b"B").await;
    let pool = Arc::new(TargetPool::new(vec![flaky, steady], 1, 1));
    let (proxy_addr, _shutdown) = start_proxy(pool.clone()).await;

    pool.record_probe(flaky, false);
    assert_eq!(pool.healthy_snapshot().as_slice(), &[steady]);

    for _ in 0..4 {
        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let mut buf = [0u8; 1];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"B");
    }
}

#[tokio::test]
async fn test_prober_removes_dead_target_from_snapshot() {
    let live = spawn_echo_backend().await;
    let dead = reserved_dead_addr().await;
    let pool = Arc::new(TargetPool::new(vec![live, dead], 2, 1));

    let prober = Prober::new(
        pool.clone(),
        Duration::from_millis(50),
        Duration::from_millis(200),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    prober.start(shutdown_rx).await;

    // Give the prober a few rounds to cross the failure threshold
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(pool.healthy_snapshot().as_slice(), &[live]);

    let _ = shutdown_tx.send(true);
}

#[tokio::test]
async fn test_shutdown_drains_established_sessions() {
    let backend = spawn_echo_backend().await;
    let pool = Arc::new(TargetPool::new(vec![backend], 3, 2));
    let (proxy_addr, shutdown) = start_proxy(pool).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    client.read_exact(&mut buf).await.unwrap();

    shutdown.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The established session keeps flowing after the accept loop stops
    client.write_all(b"yo").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"yo");
}
