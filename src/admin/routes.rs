//! Admin surface - health, readiness and status endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::AgentError;
use crate::proxy::TargetStatus;
use crate::reconciler::ReconcileOutcome;
use crate::AppState;

/// Build the admin router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status))
        .route("/reconcile", post(trigger_reconcile))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

/// Liveness: healthy until consecutive pass failures cross the threshold.
///
/// The owning group points its health check here; a 503 tells it to
/// replace the instance.
async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.monitor.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Readiness: gated on the attribute mutation and the first clean pass
async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.monitor.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Serialize)]
struct StatusResponse {
    ready: bool,
    healthy: bool,
    consecutive_failures: u32,
    last_pass: Vec<ReconcileOutcome>,
    listeners: Vec<ListenerStatus>,
}

#[derive(Serialize)]
struct ListenerStatus {
    port: u16,
    targets: Vec<TargetStatus>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let listeners = state
        .pools
        .iter()
        .map(|lp| ListenerStatus {
            port: lp.port,
            targets: lp.pool.statuses(),
        })
        .collect();

    Json(StatusResponse {
        ready: state.monitor.is_ready(),
        healthy: state.monitor.is_healthy(),
        consecutive_failures: state.monitor.consecutive_failures(),
        last_pass: state.board.latest(),
        listeners,
    })
}

/// External wake source for the reconcile loop, e.g. an orchestration
/// hook fired when a sibling instance terminates
async fn trigger_reconcile(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<StatusCode, AgentError> {
    match &state.reconcile_tx {
        Some(tx) => {
            tx.try_send(()).map_err(|_| AgentError::TriggerBusy)?;
            Ok(StatusCode::ACCEPTED)
        }
        None => Ok(StatusCode::CONFLICT),
    }
}
