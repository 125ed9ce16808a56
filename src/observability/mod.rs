//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros with structured fields
//!     → logging.rs (subscriber: filter + formatter)
//!     → stdout (JSON in production, human-readable elsewhere)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing in production
//! - Request ID flows through the request span (see http::request)
//! - `RUST_LOG` wins over the configured level when set

pub mod logging;
