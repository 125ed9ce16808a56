//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Init logging → Open pool → Bind listener → Serve
//!
//! Serving (server.rs, connection.rs):
//!     Accept loop → one task per connection → router
//!
//! Shutdown (signals.rs, shutdown.rs, server.rs):
//!     SIGTERM/SIGINT → Stop accepting → Drain connections → Force-close
//!     after deadline → Close pool → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listener
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: connections still open at the deadline are aborted

pub mod connection;
pub mod server;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use server::{Listener, Server, ServerError, ServerState};
pub use shutdown::{Shutdown, Trigger};
pub use signals::{Signal, Termination};
pub use startup::{run, StartupError};
