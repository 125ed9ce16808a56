//! Shared backend infrastructure: configuration, logging, a pooled
//! PostgreSQL handle with scoped transactions, an HTTP server with bounded
//! graceful shutdown, and the error taxonomy that maps failures to HTTP
//! responses.

pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::Config;
pub use database::{Database, TransactionManager};
pub use error::{Error, ErrorKind};
pub use lifecycle::{Server, Shutdown};
