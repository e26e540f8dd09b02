/// Database layer for the matching service
///
/// Manages the SQLite connection pool, embedded migrations, and the
/// classification of constraint violations raised by the store.

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> MarketResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(if options.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        })
        .foreign_keys(true)
        .busy_timeout(options.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> MarketResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| MarketError::Internal(format!("Migration failed: {}", e)))?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> MarketResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Constraint class reported by the store for a rejected write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Unique,
    Check,
    ForeignKey,
}

/// Classify a sqlx error as a constraint violation, if it is one
pub fn constraint_violation(err: &sqlx::Error) -> Option<ConstraintViolation> {
    let db_err = err.as_database_error()?;
    match db_err.kind() {
        ErrorKind::UniqueViolation => Some(ConstraintViolation::Unique),
        ErrorKind::CheckViolation => Some(ConstraintViolation::Check),
        ErrorKind::ForeignKeyViolation => Some(ConstraintViolation::ForeignKey),
        _ => None,
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> MarketResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MarketError::Internal(format!("Invalid timestamp: {}", e)))
}

/// Migrated, file-backed database in a temp directory.
///
/// File-backed rather than `:memory:` so every pooled connection sees the
/// same data.
#[cfg(test)]
pub(crate) async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(&dir.path().join("market.sqlite"), DatabaseOptions::default())
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    (pool, dir)
}
