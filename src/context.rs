/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    error::{MarketError, MarketResult},
    matching::MatchingCoordinator,
    offer::OfferManager,
    rate_limit::RateLimiter,
    reference::ReferenceManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub references: Arc<ReferenceManager>,
    pub offers: Arc<OfferManager>,
    pub matching: Arc<MatchingCoordinator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> MarketResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    MarketError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..db::DatabaseOptions::default()
        };
        let pool = db::create_pool(&config.storage.market_db, options).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        tracing::info!(path = ?config.storage.market_db, "market database ready");

        Ok(Self::from_pool(config, pool))
    }

    /// Wire the managers over an already-migrated pool
    pub fn from_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let references = ReferenceManager::new(pool.clone(), config.listing.clone());
        let offers = OfferManager::new(pool.clone(), references.clone());
        let matching = MatchingCoordinator::new(pool.clone(), offers.clone(), references.clone());
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            config: Arc::new(config),
            db: pool,
            references: Arc::new(references),
            offers: Arc::new(offers),
            matching: Arc::new(matching),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
