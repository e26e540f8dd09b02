/// Health check endpoints for liveness and readiness probes
///
/// Supports two types of probes:
/// - Liveness: Is the process alive? (restart if not)
/// - Readiness: Can it reach the market database? (stop routing if not)
///
/// Also exports Prometheus metrics at `/metrics`.

use crate::{context::AppContext, db, metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::time::Instant;

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/metrics", get(metrics_endpoint))
}

/// Basic health check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Liveness probe
///
/// If we can respond, we're alive.
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe
///
/// Returns 200 if the store answers, 503 otherwise.
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let start = Instant::now();

    if let Err(e) = db::test_connection(&ctx.db).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION"),
        "database": {
            "type": "sqlite",
            "pool_size": ctx.db.size(),
            "response_time_ms": start.elapsed().as_millis() as u64,
        }
    })))
}

/// Prometheus text exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
