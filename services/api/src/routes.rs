use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;

use agora_engine::workflows::enrollment::{enrollment_router, EnrollmentApi};
use agora_engine::workflows::impact::{impact_router, ImpactValidationService};
use agora_engine::workflows::notify::NotificationOutbox;

use crate::infra::{AppState, InMemoryLedger, InMemoryRuleStore};

pub(crate) fn app_router(
    enrollment: EnrollmentApi<InMemoryLedger, InMemoryRuleStore, NotificationOutbox>,
    impact: Arc<ImpactValidationService<InMemoryLedger>>,
) -> axum::Router {
    enrollment_router(enrollment)
        .merge(impact_router(impact))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
