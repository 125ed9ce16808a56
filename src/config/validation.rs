//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde and env parsing handle syntax)
//! - Validate value ranges (ports, pool sizes)
//! - Enforce production-only requirements (JWT secret)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::Config;

const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];
const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];
const SSL_MODES: &[&str] = &["disable", "require", "verify-full"];

/// A single failed rule, keyed by the environment variable that controls it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{key} is required")]
    Required { key: &'static str },

    #[error("{key} must be one of: {}", allowed.join(", "))]
    OneOf {
        key: &'static str,
        allowed: &'static [&'static str],
    },

    #[error("{key} must be between {min} and {max}")]
    Range { key: &'static str, min: i64, max: i64 },

    #[error("{key} must be at least {min}")]
    Min { key: &'static str, min: i64 },

    #[error("{key} must be at least {min} characters")]
    MinLength { key: &'static str, min: usize },
}

/// Accumulates rule violations.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(&mut self, key: &'static str, value: &str) {
        if value.is_empty() {
            self.errors.push(ValidationError::Required { key });
        }
    }

    pub fn one_of(&mut self, key: &'static str, value: &str, allowed: &'static [&'static str]) {
        if !allowed.contains(&value) {
            self.errors.push(ValidationError::OneOf { key, allowed });
        }
    }

    pub fn range(&mut self, key: &'static str, value: impl Into<i64>, min: i64, max: i64) {
        let value = value.into();
        if value < min || value > max {
            self.errors.push(ValidationError::Range { key, min, max });
        }
    }

    pub fn min(&mut self, key: &'static str, value: impl Into<i64>, min: i64) {
        if value.into() < min {
            self.errors.push(ValidationError::Min { key, min });
        }
    }

    pub fn min_length(&mut self, key: &'static str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.errors.push(ValidationError::MinLength { key, min });
        }
    }

    /// Consume the validator, yielding every violation found.
    pub fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Validate a fully merged configuration snapshot.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut v = Validator::new();

    v.required("APP_ENV", &config.app.environment);
    v.one_of("APP_ENV", &config.app.environment, ENVIRONMENTS);
    v.range("APP_PORT", config.app.port, 1, 65535);
    v.one_of("APP_LOG_LEVEL", &config.app.log_level, LOG_LEVELS);

    let db = &config.database;
    v.required("DB_HOST", &db.host);
    v.range("DB_PORT", db.port, 1, 65535);
    v.required("DB_NAME", &db.name);
    v.required("DB_USER", &db.user);
    v.required("DB_PASSWORD", &db.password);
    v.one_of("DB_SSL_MODE", &db.ssl_mode, SSL_MODES);
    v.min("DB_MAX_CONNECTIONS", db.max_connections, 1);
    v.min("DB_MAX_IDLE_CONNECTIONS", db.max_idle_connections, 1);

    if config.is_production() {
        v.required("JWT_SECRET", &config.jwt.secret);
        v.min_length("JWT_SECRET", &config.jwt.secret, 32);
    }

    v.finish()
}

/// Render a list of violations the way they are reported at startup.
pub fn render(errors: &[ValidationError]) -> String {
    let items: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("configuration validation failed:\n  - {}", items.join("\n  - "))
}
