//! Main entry point for the NAT Relay Agent

use nat_relay::{
    admin, attribute,
    config::Settings,
    health::HealthMonitor,
    provider::{ec2::Ec2RouteProvider, ImdsClient, RouteProvider},
    proxy::{Balancer, BalancingStrategy, Prober, ProxyListener, TargetPool},
    reconciler::{OutcomeBoard, ReconcileLoop, Reconciler},
    AgentError, AppState, ListenerPool,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();

    info!("Starting NAT relay agent");

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;
    info!(
        tables = settings.reconciler.route_table_ids.len(),
        proxy_enabled = settings.proxy.enabled,
        "Loaded configuration"
    );

    // Shutdown fan-out observed by every loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Resolve the local instance identity once
    let imds = ImdsClient::new(&settings.agent.metadata_base_url)?;
    let identity = imds.fetch_identity().await?;
    info!(
        instance_id = %identity.instance_id,
        interface_id = %identity.interface_id,
        private_ip = %identity.private_ip,
        "Resolved instance identity"
    );

    let provider: Arc<dyn RouteProvider> =
        Arc::new(Ec2RouteProvider::new(settings.agent.region.clone()).await);
    let call_timeout = Duration::from_secs(settings.reconciler.call_timeout_secs);

    let monitor = Arc::new(HealthMonitor::new(
        settings.reconciler.failure_threshold,
        settings.reconciler.enabled,
    ));

    // Disable the source/destination check before the first pass
    attribute::disable_source_dest_check(provider.as_ref(), &identity, call_timeout).await;
    monitor.mark_attribute_attempted();

    // Route table reconciliation
    let board = Arc::new(OutcomeBoard::default());
    let (reconcile_tx, reconcile_rx) = mpsc::channel(8);
    let reconcile_tx = if settings.reconciler.enabled {
        let reconciler = Reconciler::new(
            provider.clone(),
            identity.clone(),
            settings.reconciler.route_table_ids.clone(),
            call_timeout,
        );
        let control = ReconcileLoop::new(
            reconciler,
            monitor.clone(),
            board.clone(),
            Duration::from_secs(settings.reconciler.interval_secs),
            reconcile_rx,
        );
        tokio::spawn(control.run(shutdown_rx.clone()));
        Some(reconcile_tx)
    } else {
        None
    };

    // Forwarding proxy
    let mut pools = Vec::new();
    let mut probers = Vec::new();
    if settings.proxy.enabled {
        let strategy = BalancingStrategy::parse(&settings.proxy.strategy).unwrap_or_default();
        let connect_timeout = Duration::from_millis(settings.proxy.connect_timeout_ms);

        for listener_cfg in &settings.proxy.listeners {
            let targets: Vec<SocketAddr> = listener_cfg
                .backends
                .iter()
                .map(|b| b.parse().map_err(|_| AgentError::InvalidTarget(b.clone())))
                .collect::<Result<_, _>>()?;
            let pool = Arc::new(TargetPool::new(
                targets,
                settings.proxy.probe_failure_threshold,
                settings.proxy.probe_recovery_threshold,
            ));
            let balancer = Arc::new(Balancer::new(strategy));

            let prober = Prober::new(
                pool.clone(),
                Duration::from_secs(settings.proxy.probe_interval_secs),
                Duration::from_millis(settings.proxy.probe_timeout_ms),
            );
            prober.start(shutdown_rx.clone()).await;
            probers.push(prober);

            let bind_addr = SocketAddr::from(([0, 0, 0, 0], listener_cfg.port));
            let listener = ProxyListener::bind(
                bind_addr,
                pool.clone(),
                balancer,
                connect_timeout,
                settings.proxy.retry_limit,
            )
            .await?;
            tokio::spawn(listener.run(shutdown_rx.clone()));

            pools.push(ListenerPool {
                port: listener_cfg.port,
                pool,
            });
        }
    }

    // Admin surface
    let state = Arc::new(AppState {
        monitor: monitor.clone(),
        board: board.clone(),
        pools,
        reconcile_tx,
    });
    let app = admin::routes::create_router(state);

    let addr = format!(
        "{}:{}",
        settings.agent.admin_host, settings.agent.admin_port
    );
    info!(addr = %addr, "Admin server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Drain-then-exit: flip the shutdown watch once a signal arrives
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Termination signal received, draining");
        let _ = shutdown_tx.send(true);
    });

    let mut serve_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await?;

    info!("NAT relay agent stopped");
    Ok(())
}

/// Wait for SIGTERM or ctrl-c
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
