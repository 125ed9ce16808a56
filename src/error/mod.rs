//! Error taxonomy shared by every layer of the service.
//!
//! # Data Flow
//! ```text
//! domain / database / infrastructure failure
//!     → Error (kind-tagged, optionally wrapping a cause)
//!     → wrapped with context while propagating (kind is preserved)
//!     → http.rs classifies at the boundary (status, code, message)
//! ```
//!
//! # Design Decisions
//! - The kind is decided once, where the failure originates
//! - Wrapping adds text but never changes the kind
//! - Internal kinds never leak their text to HTTP clients

pub mod http;

use std::borrow::Cow;
use std::fmt;

pub use http::{classify, Classification, ErrorResponse};

/// Boxed foreign error carried as a cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Domain
    Validation,
    InvalidInput,
    BusinessRule,
    NotFound,
    AlreadyExists,

    // Auth
    Unauthorized,
    Forbidden,

    // Below the domain layer
    Database,
    Transaction,
    Infrastructure,
    External,
    Internal,
}

impl ErrorKind {
    /// Text used when an error of this kind is created without a message.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation failed",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::BusinessRule => "business rule violation",
            ErrorKind::NotFound => "resource not found",
            ErrorKind::AlreadyExists => "resource already exists",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Database => "database error",
            ErrorKind::Transaction => "transaction error",
            ErrorKind::Infrastructure => "infrastructure error",
            ErrorKind::External => "external service error",
            ErrorKind::Internal => "internal error",
        }
    }

    /// Failures whose detail must stay in the operator log.
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            ErrorKind::Database
                | ErrorKind::Transaction
                | ErrorKind::Infrastructure
                | ErrorKind::External
                | ErrorKind::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

/// A kind-tagged error, optionally wrapping its cause.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A failure created at its origin.
    #[error("{message}")]
    Kind {
        kind: ErrorKind,
        message: Cow<'static, str>,
    },

    /// Context added on the way up; the inner kind is kept.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// A foreign error adopted into the taxonomy.
    #[error("{context}: {source}")]
    Foreign {
        kind: ErrorKind,
        context: Cow<'static, str>,
        #[source]
        source: BoxError,
    },

    /// A unit of work failed and rolling it back failed too.
    #[error("tx error: {source}, rollback error: {rollback}")]
    RollbackFailed {
        #[source]
        source: Box<Error>,
        rollback: Box<Error>,
    },
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Error::Kind {
            kind,
            message: message.into(),
        }
    }

    /// An error carrying only the kind's default text.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn business_rule(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BusinessRule, message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn unauthorized() -> Self {
        Self::from_kind(ErrorKind::Unauthorized)
    }

    pub fn forbidden() -> Self {
        Self::from_kind(ErrorKind::Forbidden)
    }

    /// Adopt a foreign error under `kind`, prefixed with `context`.
    pub fn foreign(
        kind: ErrorKind,
        context: impl Into<Cow<'static, str>>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Foreign {
            kind,
            context: context.into(),
            source: source.into(),
        }
    }

    /// Shorthand for an `Infrastructure` failure caused by `source`.
    pub fn infrastructure(context: impl Into<Cow<'static, str>>, source: impl Into<BoxError>) -> Self {
        Self::foreign(ErrorKind::Infrastructure, context, source)
    }

    /// Combine a unit-of-work failure with the rollback failure that followed it.
    pub fn rollback_failed(original: Error, rollback: Error) -> Self {
        Error::RollbackFailed {
            source: Box::new(original),
            rollback: Box::new(rollback),
        }
    }

    /// Prefix this error with `context`, keeping its kind.
    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The kind decided where the failure originated.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kind { kind, .. } | Error::Foreign { kind, .. } => *kind,
            Error::Context { source, .. } | Error::RollbackFailed { source, .. } => source.kind(),
        }
    }

    /// Whether this error is, or wraps, a failure of `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// The failure that happened while cleaning up, if any.
    pub fn rollback_error(&self) -> Option<&Error> {
        match self {
            Error::RollbackFailed { rollback, .. } => Some(rollback),
            Error::Context { source, .. } => source.rollback_error(),
            _ => None,
        }
    }

    /// Text safe to show the caller for domain kinds.
    ///
    /// Identical to `Display`, except that a rollback failure contributes
    /// nothing: clients see the original cause only.
    pub fn client_message(&self) -> String {
        match self {
            Error::RollbackFailed { source, .. } => source.client_message(),
            Error::Context { context, source } => format!("{}: {}", context, source.client_message()),
            other => other.to_string(),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::from_kind(kind)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => ErrorKind::NotFound,
            _ => ErrorKind::Database,
        };
        Error::foreign(kind, kind.default_message(), err)
    }
}

/// Adds context to `Result<T, Error>` without matching on it.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, Error>;

    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context(self, context: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.context(f()))
    }
}
