//! Connection pool and schema migrations
//!
//! Pool sizing and timeouts come from the API configuration. Every pooled
//! connection carries a `lock_timeout`, which bounds how long a schedule or
//! invoice edit waits for the case or invoice row another edit holds.

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::DatabaseError;

/// Type alias for the PostgreSQL connection pool
pub type DatabasePool = PgPool;

/// Pool settings for the billing database
///
/// ```rust
/// use infra_db::DatabaseConfig;
///
/// let config = DatabaseConfig {
///     max_connections: 20,
///     ..DatabaseConfig::new("postgres://localhost/case_billing")
/// };
/// assert_eq!(config.lock_timeout().as_millis(), 5_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free connection
    pub acquire_timeout_secs: u64,
    /// How long an edit waits for a locked case or invoice row
    pub lock_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Default pool settings for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Connection options with the session settings every connection gets
    fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("invalid database url: {}", e)))?;
        Ok(options.options([("lock_timeout", format!("{}ms", self.lock_timeout_ms))]))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/case_billing".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            lock_timeout_ms: 5_000,
        }
    }
}

/// Creates the connection pool
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` if the URL is invalid or the
/// first connection cannot be established
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        lock_timeout_ms = config.lock_timeout_ms,
        "Creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(config.connect_options()?)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

    info!("Database pool created");
    Ok(pool)
}

/// Applies the embedded migrations under `migrations/`
///
/// Migrations already recorded in `_sqlx_migrations` are skipped, so this is
/// safe to call on every start.
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    info!("Running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Database migrations complete");
    Ok(())
}
