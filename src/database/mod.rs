//! Database subsystem.
//!
//! # Data Flow
//! ```text
//! startup:
//!     DatabaseConfig → pool.rs (options → connect → ping) → Database
//!     Database → health.rs (periodic probe until shutdown)
//!
//! per request:
//!     handler → transaction.rs (begin → unit of work → commit | rollback)
//!             → pool lease released when the transaction finishes
//!
//! shutdown:
//!     main → Database::close (once; repeated calls are no-ops)
//! ```
//!
//! # Design Decisions
//! - The pool is the only shared mutable resource; sqlx synchronizes it
//! - Transactions are passed explicitly, never looked up from ambient state
//! - No retries: a failed begin/commit/rollback is reported to the caller

pub mod health;
pub mod pool;
pub mod transaction;

pub use health::{Liveness, PoolHealthMonitor};
pub use pool::{close, health_check, Database};
pub use transaction::{Transaction, TransactionManager, TransactionSource};
