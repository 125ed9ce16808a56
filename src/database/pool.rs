//! PostgreSQL connection pool.
//!
//! # Responsibilities
//! - Translate [`DatabaseConfig`] into sqlx connect and pool options
//! - Verify liveness before handing the pool out
//! - Close the pool exactly once on shutdown (closing twice is harmless)
//!
//! # Design Decisions
//! - A failed probe closes the pool before returning: callers never see
//!   a half-initialized pool
//! - Idle eviction and the health-check period are fixed, not configured

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use crate::config::DatabaseConfig;
use crate::error::Error;

/// Idle connections older than this are closed.
pub const MAX_CONN_IDLE_TIME: Duration = Duration::from_secs(30 * 60);

/// Interval between background liveness probes.
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(60);

/// Bound applied by [`health_check`].
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Owned handle to the process-wide connection pool.
///
/// Cloning is cheap and shares the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Build the pool and perform one liveness probe.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, Error> {
        let connect = connect_options(config)
            .map_err(|e| Error::infrastructure("unable to parse database config", e))?;

        let pool = pool_options(config)
            .connect_with(connect)
            .await
            .map_err(|e| Error::infrastructure("unable to create connection pool", e))?;

        if let Err(e) = ping(&pool).await {
            pool.close().await;
            return Err(Error::infrastructure("unable to ping database", e));
        }

        tracing::debug!(
            max_connections = config.max_connections,
            min_connections = config.max_idle_connections,
            max_lifetime = ?config.connection_lifetime,
            "connection pool ready"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by callers that build their own).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Release every connection. Idempotent.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            tracing::info!("closing database connection pool");
        }
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Liveness probe bounded by `timeout`, independent of pool timeouts.
    pub async fn health_check(&self, timeout: Duration) -> Result<(), Error> {
        match tokio::time::timeout(timeout, ping(&self.pool)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::infrastructure("database health check failed", e)),
            Err(elapsed) => Err(Error::infrastructure("database health check failed", elapsed)),
        }
    }
}

/// Close `db` if there is one.
pub async fn close(db: Option<&Database>) {
    if let Some(db) = db {
        db.close().await;
    }
}

/// [`Database::health_check`] with the default bound.
pub async fn health_check(db: &Database) -> Result<(), Error> {
    db.health_check(HEALTH_CHECK_TIMEOUT).await
}

/// Connection parameters for a single physical connection.
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, sqlx::Error> {
    let port = u16::try_from(config.port)
        .map_err(|_| sqlx::Error::Configuration(format!("port {} out of range", config.port).into()))?;
    let ssl_mode = PgSslMode::from_str(&config.ssl_mode)?;

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .ssl_mode(ssl_mode))
}

/// Pool bounds derived from the configuration.
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.max_idle_connections.min(config.max_connections))
        .max_lifetime(config.connection_lifetime)
        .idle_timeout(MAX_CONN_IDLE_TIME)
        .acquire_timeout(config.acquire_timeout)
        .test_before_acquire(true)
}

async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}
