//! Functional tests for the admin surface

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

use nat_relay::admin::routes::create_router;
use nat_relay::health::HealthMonitor;
use nat_relay::reconciler::{OutcomeBoard, ReconcileAction, ReconcileOutcome};
use nat_relay::AppState;

fn state_with(
    monitor: HealthMonitor,
    board: OutcomeBoard,
    reconcile_tx: Option<mpsc::Sender<()>>,
) -> Arc<AppState> {
    Arc::new(AppState {
        monitor: Arc::new(monitor),
        board: Arc::new(board),
        pools: vec![],
        reconcile_tx,
    })
}

async fn get(app: axum::Router, uri: &str) -> StatusCode {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_readyz_gates_until_first_clean_pass() {
    let monitor = HealthMonitor::new(3, true);
    monitor.mark_attribute_attempted();
    let app = create_router(state_with(monitor, OutcomeBoard::default(), None));

    assert_eq!(get(app, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_after_clean_pass() {
    let monitor = HealthMonitor::new(3, true);
    monitor.mark_attribute_attempted();
    monitor.record_pass(&[ReconcileOutcome {
        table_id: "rtb-01".to_string(),
        action: ReconcileAction::Created,
    }]);
    let app = create_router(state_with(monitor, OutcomeBoard::default(), None));

    assert_eq!(get(app, "/readyz").await, StatusCode::OK);
}

#[tokio::test]
async fn test_healthz_flips_after_threshold() {
    let monitor = HealthMonitor::new(1, true);
    monitor.record_pass(&[ReconcileOutcome {
        table_id: "rtb-01".to_string(),
        action: ReconcileAction::Failed("throttled".to_string()),
    }]);
    let app = create_router(state_with(monitor, OutcomeBoard::default(), None));

    assert_eq!(get(app, "/healthz").await, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_reports_latest_pass() {
    let board = OutcomeBoard::default();
    board.publish(vec![ReconcileOutcome {
        table_id: "rtb-01".to_string(),
        action: ReconcileAction::Unchanged,
    }]);
    let app = create_router(state_with(HealthMonitor::new(3, true), board, None));

    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["last_pass"][0]["table_id"], "rtb-01");
    assert_eq!(status["last_pass"][0]["action"], "unchanged");
}

#[tokio::test]
async fn test_reconcile_trigger_enqueues_a_wake() {
    let (tx, mut rx) = mpsc::channel(1);
    let app = create_router(state_with(
        HealthMonitor::new(3, true),
        OutcomeBoard::default(),
        Some(tx),
    ));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reconcile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_reconcile_trigger_conflicts_when_disabled() {
    let app = create_router(state_with(
        HealthMonitor::new(3, false),
        OutcomeBoard::default(),
        None,
    ));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reconcile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
