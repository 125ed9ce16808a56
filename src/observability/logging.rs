//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once per process
//! - Translate the configured log level into a filter
//! - Pick the output format from the environment

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::config::ApplicationConfig;

/// Error type for logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Pretty,
}

impl Format {
    pub fn for_environment(environment: &str) -> Self {
        if environment == "production" {
            Format::Json
        } else {
            Format::Pretty
        }
    }
}

/// Filter directive for a configured level, e.g. `"warn"` → `"shared_infra=warn,tower_http=warn"`.
pub fn directive(level: &str) -> String {
    let level = match level {
        "debug" | "info" | "warn" | "error" => level,
        _ => "info",
    };
    format!("{level},shared_infra={level},tower_http={level}")
}

/// Install the global subscriber.
pub fn init(config: &ApplicationConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(directive(&config.log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match Format::for_environment(&config.environment) {
        Format::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()?,
        Format::Pretty => registry.with(fmt::layer().with_target(true)).try_init()?,
    }

    Ok(())
}
