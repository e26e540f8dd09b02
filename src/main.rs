/// nail-match - reference/offer matching service
///
/// Clients post nail-art references, pros answer with offers, and the
/// client accepts exactly one of them.

mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod matching;
mod metrics;
mod offer;
mod policy;
mod rate_limit;
mod reference;
mod server;

use config::ServerConfig;
use context::AppContext;
use error::MarketResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> MarketResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nail_match=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(version = %config.service.version, "starting nail-match");

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
