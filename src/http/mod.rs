//! HTTP surface of the service.
//!
//! # Data Flow
//! ```text
//! connection (lifecycle::connection)
//!     → request.rs (assign / propagate X-Request-ID)
//!     → router.rs (trace span, panic recovery, deadline, CORS)
//!     → /health, /health/db, or routes mounted under /api/v1
//!     → handler Result<_, error::Error> → error::http (JSON error body)
//! ```

pub mod request;
pub mod router;

pub use request::{MakeRequestUuidV4, RequestIdExt, X_REQUEST_ID};
pub use router::{build, API_PREFIX};
