//! Error types for keystone
//!
//! This module defines the single error type used throughout the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Callers branch on [`ErrorKind`], never on message text. A `NotFound` from a
//! point lookup is an expected outcome and is always distinct from an
//! `InternalQueryFailure`.

use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias for keystone operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by query failures
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Classification of an [`Error`]
///
/// The kind is the stable contract: messages may change, kinds do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A point lookup matched zero rows
    NotFound,
    /// A lease is held by another, still active holder
    AlreadyLocked,
    /// Release or payload update attempted by a worker that does not hold the lease
    LockNotOwned,
    /// Transport, execution or row decoding failure
    InternalQueryFailure,
    /// A pagination token that was not produced by this system, or was altered
    CorruptCursor,
    /// Optimistic validation failed at commit time
    Conflict,
    /// The operation's context was cancelled
    Cancelled,
    /// The operation's context deadline passed
    DeadlineExceeded,
    /// The caller supplied an invalid argument
    InvalidInput,
    /// A query template failed to compile or render
    Template,
}

/// Error type for keystone
#[derive(Debug, Error)]
pub enum Error {
    /// Point lookup matched zero rows
    #[error("not found: {0}")]
    NotFound(String),

    /// Lease held by another active holder
    #[error("resource '{resource_id}' is already locked by another holder")]
    AlreadyLocked {
        /// Resource the caller tried to lock
        resource_id: String,
    },

    /// Lease not held by the caller
    #[error("lock on resource '{resource_id}' is not owned by '{holder_id}'")]
    LockNotOwned {
        /// Resource the caller tried to release
        resource_id: String,
        /// Holder that attempted the operation
        holder_id: String,
    },

    /// Statement execution or row decoding failed
    #[error("query failed: {message}")]
    InternalQueryFailure {
        /// What was being attempted
        message: String,
        /// Underlying cause, if any
        #[source]
        source: Option<BoxError>,
    },

    /// Pagination token could not be decoded
    #[error("corrupt cursor: {0}")]
    CorruptCursor(String),

    /// Transaction aborted by validation
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Context cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Context deadline exceeded
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Template compile or render failure
    #[error("template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// What went wrong
        message: String,
    },
}

impl Error {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyLocked { .. } => ErrorKind::AlreadyLocked,
            Error::LockNotOwned { .. } => ErrorKind::LockNotOwned,
            Error::InternalQueryFailure { .. } => ErrorKind::InternalQueryFailure,
            Error::CorruptCursor(_) => ErrorKind::CorruptCursor,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Template { .. } => ErrorKind::Template,
        }
    }

    /// Create a `NotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create an `InternalQueryFailure` without an underlying cause
    pub fn internal(message: impl Into<String>) -> Self {
        Error::InternalQueryFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying cause into an `InternalQueryFailure`
    pub fn query<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::InternalQueryFailure {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a `Conflict` error
    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Create a `CorruptCursor` error
    pub fn corrupt_cursor(message: impl Into<String>) -> Self {
        Error::CorruptCursor(message.into())
    }

    /// Create a `Template` error
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for `Conflict`, the only kind the transaction runner retries
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// True for `Cancelled` and `DeadlineExceeded`
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::query("row decoding failed", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::not_found("WebFeatures key 'grid'");
        assert!(err.to_string().contains("not found"));
        assert!(err.to_string().contains("grid"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_lock_errors() {
        let err = Error::AlreadyLocked {
            resource_id: "S1".to_string(),
        };
        assert!(err.to_string().contains("S1"));
        assert_eq!(err.kind(), ErrorKind::AlreadyLocked);

        let err = Error::LockNotOwned {
            resource_id: "S1".to_string(),
            holder_id: "w2".to_string(),
        };
        assert!(err.to_string().contains("w2"));
        assert_eq!(err.kind(), ErrorKind::LockNotOwned);
    }

    #[test]
    fn test_query_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "socket closed");
        let err = Error::query("executing statement", io);
        assert_eq!(err.kind(), ErrorKind::InternalQueryFailure);
        let source = std::error::Error::source(&err).expect("source should be kept");
        assert!(source.to_string().contains("socket closed"));
    }

    #[test]
    fn test_serde_error_is_internal_failure() {
        let bad: std::result::Result<u32, serde_json::Error> = serde_json::from_str("\"x\"");
        let err: Error = bad.unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InternalQueryFailure);
    }

    #[test]
    fn test_not_found_is_never_internal() {
        assert_ne!(Error::not_found("x").kind(), Error::internal("x").kind());
    }

    #[test]
    fn test_cancellation_predicates() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(!Error::conflict("x").is_cancellation());
        assert!(Error::conflict("x").is_conflict());
    }
}
