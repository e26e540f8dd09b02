/// HTTP server setup and routing
use crate::{
    api::middleware::track_requests,
    context::AppContext,
    error::{MarketError, MarketResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(crate::api::routes())
        .with_state(ctx.clone())
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(middleware::from_fn(track_requests))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> MarketResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("nail-match listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());
    info!("   Database: {:?}", ctx.config.storage.market_db);

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MarketError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MarketError::Internal(format!("Server error: {}", e)))?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use crate::config::test_config;
    use crate::context::AppContext;
    use crate::db;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let app = TestApp::new().await;

        let (status, json) = app.call(Method::GET, "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_write_rate_limit_applies() {
        let (pool, dir) = db::test_pool().await;
        let mut config = test_config(dir.path().to_path_buf());
        config.rate_limit.enabled = true;
        config.rate_limit.write_rps = 1;
        let router = super::build_router(AppContext::from_pool(config, pool));

        let delete = || {
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/offers/missing")
                .body(Body::empty())
                .unwrap()
        };

        let first = router.clone().oneshot(delete()).await.unwrap();
        assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

        let second = router.clone().oneshot(delete()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));

        let read = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        assert_eq!(router.oneshot(read).await.unwrap().status(), StatusCode::OK);
    }
}
