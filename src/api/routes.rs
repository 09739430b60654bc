use crate::api::infra::{AppState, DynPipeline};
use crate::intake::loan_router;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

/// Loan endpoints plus health, readiness and metrics.
pub fn with_service_routes(pipeline: Arc<DynPipeline>) -> axum::Router {
    loan_router(pipeline)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck(Extension(state): Extension<AppState>) -> Json<serde_json::Value> {
    let (db, model) = tokio::join!(
        state.pipeline.store().ping(),
        state.pipeline.scoring().health()
    );

    let db_status = match db {
        Ok(()) => "connected",
        Err(err) => {
            warn!(error = %err, "store health check failed");
            "disconnected"
        }
    };
    let model_status = match model {
        Ok(()) => "available",
        Err(err) => {
            warn!(error = %err, "scoring health check failed");
            "unavailable"
        }
    };

    let status = if db_status == "connected" && model_status == "available" {
        "ok"
    } else {
        "error"
    };

    Json(json!({ "status": status, "db": db_status, "model": model_status }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
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
