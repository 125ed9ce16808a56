//! Configuration schema definitions.
//!
//! This module defines the complete configuration snapshot for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration snapshot.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Application-level settings (environment, port, log level).
    pub app: ApplicationConfig,

    /// PostgreSQL connection and pool settings.
    pub database: DatabaseConfig,

    /// HTTP server timeouts.
    pub server: ServerConfig,

    /// Token signing settings.
    pub jwt: JwtConfig,

    /// Cross-origin request policy.
    pub cors: CorsConfig,
}

impl Config {
    /// True when running in the `development` environment.
    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }

    /// True when running in the `production` environment.
    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}

/// Application-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// development, staging or production.
    pub environment: String,

    /// Port the HTTP server listens on.
    pub port: u32,

    /// debug, info, warn or error.
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

/// Database connection configuration.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u32,
    pub name: String,
    pub user: String,
    pub password: String,

    /// disable, require or verify-full.
    pub ssl_mode: String,

    /// Upper bound on pooled connections.
    pub max_connections: u32,

    /// Connections kept open while idle.
    pub max_idle_connections: u32,

    /// Maximum lifetime of a single physical connection.
    #[serde(with = "crate::config::duration")]
    pub connection_lifetime: Duration,

    /// How long acquiring a connection may wait before failing.
    #[serde(with = "crate::config::duration")]
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Key/value connection string for this database.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            self.host, self.port, self.user, self.password, self.name, self.ssl_mode,
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "logistics_db".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            ssl_mode: "disable".to_string(),
            max_connections: 25,
            max_idle_connections: 5,
            connection_lifetime: Duration::from_secs(5 * 60),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

// Hand-written so the password never ends up in logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("max_idle_connections", &self.max_idle_connections)
            .field("connection_lifetime", &self.connection_lifetime)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// HTTP server timeouts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Time allowed for a client to send request headers.
    #[serde(with = "crate::config::duration")]
    pub read_timeout: Duration,

    /// Deadline for producing a response.
    #[serde(with = "crate::config::duration")]
    pub write_timeout: Duration,

    /// Keep-alive idle limit.
    #[serde(with = "crate::config::duration")]
    pub idle_timeout: Duration,

    /// Bound on graceful draining, measured from the shutdown trigger.
    #[serde(with = "crate::config::duration")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// JWT authentication configuration.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,

    #[serde(with = "crate::config::duration")]
    pub expiry: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiry: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// CORS configuration. A single `*` entry allows anything.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
        }
    }
}
