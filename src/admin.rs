//! Admin HTTP surface: `POST /api/v1/switchdb` to trigger a hot swap, and
//! (when enabled) `GET /metrics` for Prometheus scraping.

use crate::metrics::Metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

#[derive(Clone)]
struct AdminState {
    hotswap_tx: Sender<String>,
    metrics: Arc<Metrics>,
}

#[derive(Deserialize)]
struct SwitchDbForm {
    #[serde(default)]
    filename: String,
}

pub fn router(hotswap_tx: Sender<String>, metrics: Arc<Metrics>, expose_metrics: bool) -> Router {
    let state = AdminState { hotswap_tx, metrics };
    let mut router = Router::new().route("/api/v1/switchdb", post(switchdb));
    if expose_metrics {
        router = router.route("/metrics", get(metrics_endpoint));
    }
    router.with_state(state)
}

async fn switchdb(
    State(state): State<AdminState>,
    Form(form): Form<SwitchDbForm>,
) -> (StatusCode, String) {
    if form.filename.is_empty() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal error".to_string());
    }
    match state.hotswap_tx.send(form.filename).await {
        Ok(()) => (StatusCode::OK, "OK".to_string()),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "500 Internal error".to_string(),
        ),
    }
}

async fn metrics_endpoint(State(state): State<AdminState>) -> String {
    state.metrics.render_prometheus()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn switchdb_rejects_empty_filename_with_500() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let app = router(tx, Arc::new(Metrics::new()), false);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/switchdb")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("filename="))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn switchdb_enqueues_the_requested_path() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let app = router(tx, Arc::new(Metrics::new()), false);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/switchdb")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("filename=/tmp/new-db"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap(), "/tmp/new-db");
    }

    #[tokio::test]
    async fn metrics_endpoint_is_absent_when_disabled() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let app = router(tx, Arc::new(Metrics::new()), false);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
