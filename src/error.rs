//! Error types for store operations

use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Caller supplied invalid arguments; never retried
    #[error("usage error: {0}")]
    Usage(String),

    /// No key pair with the given name is available to the key provider
    #[error("no key pair named '{0}' is available")]
    MissingKey(String),

    /// Object was written with a metadata format version we do not understand
    #[error("{uri}: object written with unsupported format version {found}, expected {expected}")]
    UnsupportedVersion {
        uri: String,
        found: String,
        expected: String,
    },

    /// Service error with an S3 error code and HTTP status
    #[error("service error ({code}): {message}")]
    Service {
        code: String,
        status: u16,
        message: String,
    },

    /// Network-level failure before a response was received
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Service asked us to slow down
    #[error("throttled by service: {0}")]
    Throttled(String),

    /// Key wrap/unwrap or part cipher failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A part stream ended before the planned byte count was read
    #[error("unexpected end of stream while {0}")]
    UnexpectedEof(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation was cancelled cooperatively
    #[error("operation cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Add context to an error
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        StoreError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Walk through `WithContext` layers to the originating error
    pub fn root_cause(&self) -> &StoreError {
        match self {
            StoreError::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if the error is transient and safe to retry
    pub fn is_retryable(&self) -> bool {
        match self.root_cause() {
            StoreError::Network(_) | StoreError::Timeout(_) | StoreError::Throttled(_) => true,
            StoreError::Io(_) | StoreError::UnexpectedEof(_) => true,
            StoreError::Service { code, status, .. } => *status >= 500 || is_retryable_code(code),
            _ => false,
        }
    }

    /// Check if the error was the service rejecting our request (4xx other
    /// than throttling). These are only retried when explicitly opted in.
    pub fn is_client_error(&self) -> bool {
        match self.root_cause() {
            StoreError::Service { code, status, .. } => {
                (400..500).contains(status) && !is_retryable_code(code)
            }
            _ => false,
        }
    }

    /// Check if the error is an object-not-found response
    pub fn is_not_found(&self) -> bool {
        match self.root_cause() {
            StoreError::Service { code, status, .. } => {
                *status == 404 || code == "NoSuchKey" || code == "NotFound"
            }
            _ => false,
        }
    }
}

/// S3 error codes that are worth retrying regardless of HTTP status
fn is_retryable_code(code: &str) -> bool {
    matches!(
        code,
        "RequestTimeout"
            | "ServiceUnavailable"
            | "InternalError"
            | "SlowDown"
            | "Throttling"
            | "ThrottlingException"
            | "TooManyRequests"
            | "RequestLimitExceeded"
            | "RequestTimeTooSkewed"
    )
}
