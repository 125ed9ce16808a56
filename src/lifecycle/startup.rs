//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging, then the database pool
//! - Start the pool health monitor
//! - Serve HTTP until a termination signal, then release resources
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)
//! - The pool is closed on every exit path once it was opened

use std::path::Path;

use axum::Router;

use crate::config::{self, ConfigError};
use crate::database::{self, Database, PoolHealthMonitor};
use crate::error::Error;
use crate::http::router;
use crate::lifecycle::server::{Server, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::logging::{self, LoggingError};

/// Error type for process startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create logger: {0}")]
    Logging(#[from] LoggingError),

    #[error("invalid port {0}")]
    Port(u32),

    #[error("failed to connect to database: {0}")]
    Database(#[source] Error),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Run the service: configuration, logging, database, then HTTP.
///
/// `api` is mounted under the versioned prefix. Returns once the server has
/// stopped and the pool is closed.
pub async fn run(config_path: Option<&Path>, api: Router) -> Result<(), StartupError> {
    let loaded = config::load(config_path)?;
    let config = loaded.config;

    logging::init(&config.app)?;
    for warning in &loaded.warnings {
        tracing::warn!(warning = %warning, "configuration override ignored");
    }

    tracing::info!(
        environment = %config.app.environment,
        port = config.app.port,
        "starting application"
    );

    let port = u16::try_from(config.app.port).map_err(|_| StartupError::Port(config.app.port))?;

    let db = Database::open(&config.database)
        .await
        .map_err(StartupError::Database)?;
    tracing::info!(
        host = %config.database.host,
        port = config.database.port,
        database = %config.database.name,
        "database connection established"
    );

    let shutdown = Shutdown::new();
    let monitor = tokio::spawn(PoolHealthMonitor::new(db.clone()).run(shutdown.subscribe()));

    let app = router::build(&config, Some(db.clone()), api);
    let result = Server::new(app, &config.server).start(port).await;

    shutdown.trigger();
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "pool health monitor did not stop cleanly");
    }
    database::close(Some(&db)).await;
    tracing::info!("database pool closed");

    match result {
        Ok(()) => {
            tracing::info!("server exited gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "server stopped with error");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_name_the_failing_stage() {
        let e = StartupError::Database(Error::infrastructure(
            "unable to ping database",
            std::io::Error::other("refused"),
        ));
        assert!(e.to_string().starts_with("failed to connect to database: "));

        let e = StartupError::Config(ConfigError::Validation(Vec::new()));
        assert!(e.to_string().starts_with("failed to load config: "));

        let e = StartupError::Port(70_000);
        assert_eq!(e.to_string(), "invalid port 70000");
    }
}
