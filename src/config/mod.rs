//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → .env + process environment (env.rs)
//!     → validation.rs (semantic checks, all errors at once)
//!     → Config (validated, immutable)
//!     → shared by reference with every subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Durations use one human-readable notation everywhere (`"30s"`, `"5m"`)

pub mod duration;
pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError, Loaded};
pub use schema::{ApplicationConfig, Config, CorsConfig, DatabaseConfig, JwtConfig, ServerConfig};
