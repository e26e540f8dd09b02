/// Configuration management for the matching service
use crate::error::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub listing: ListingConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub market_db: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret used by the identity provider to sign principals
    pub jwt_secret: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub read_rps: u32,
    pub write_rps: u32,
}

/// Bounds for list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
        }
    }
}

impl ListingConfig {
    /// Clamp a caller-supplied limit into the configured window
    pub fn clamp(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MarketResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("NAIL_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("NAIL_PORT")
            .unwrap_or_else(|_| "4100".to_string())
            .parse()
            .map_err(|_| MarketError::InvalidInput("Invalid port number".to_string()))?;
        let version = env::var("NAIL_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("NAIL_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let market_db = env::var("NAIL_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("market.sqlite"));
        let max_connections = env::var("NAIL_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let jwt_secret = env::var("NAIL_JWT_SECRET")
            .map_err(|_| MarketError::InvalidInput("JWT secret required".to_string()))?;

        let rate_limit_enabled = env::var("NAIL_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let read_rps = env::var("NAIL_RATE_LIMIT_READ_RPS")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);
        let write_rps = env::var("NAIL_RATE_LIMIT_WRITE_RPS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let default_limit = env::var("NAIL_LIST_DEFAULT_LIMIT")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);
        let max_limit = env::var("NAIL_LIST_MAX_LIMIT")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .unwrap_or(200);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                market_db,
                max_connections,
            },
            authentication: AuthConfig { jwt_secret },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                read_rps,
                write_rps,
            },
            listing: ListingConfig {
                default_limit,
                max_limit,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MarketResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MarketError::InvalidInput("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(MarketError::InvalidInput(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.listing.default_limit < 1 || self.listing.max_limit < self.listing.default_limit {
            return Err(MarketError::InvalidInput(
                "Listing limits must satisfy 1 <= default <= max".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(MarketError::InvalidInput(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(data_directory: PathBuf) -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            market_db: data_directory.join("market.sqlite"),
            data_directory,
            max_connections: 5,
        },
        authentication: AuthConfig {
            jwt_secret: "test-secret-that-is-at-least-32-characters".to_string(),
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            read_rps: 100,
            write_rps: 20,
        },
        listing: ListingConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}
