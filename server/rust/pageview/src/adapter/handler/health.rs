use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use pageview_messaging::SubscriberState;
use tokio::sync::watch;

/// AppState はヘルスチェック・メトリクスエンドポイントが参照する状態。
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<pageview_telemetry::Metrics>,
    /// 購読が構成されていない場合は None
    pub subscriber_state: Option<watch::Receiver<SubscriberState>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "pageview"}))
}

/// 購読が Active のときのみ ready とする。
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let subscriber = state.subscriber_state.as_ref().map(|rx| *rx.borrow());
    match subscriber {
        None | Some(SubscriberState::Active) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "subscriber": subscriber.map_or("disabled", SubscriberState::as_str),
            })),
        ),
        Some(s) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "not_ready", "subscriber": s.as_str()})),
        ),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.gather_metrics(),
    )
}
