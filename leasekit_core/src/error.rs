//! Error types for LeaseKit storage access.
//!
//! Two layers exist. [`ClientError`] is what a [`StorageClient`](crate::client::StorageClient)
//! reports for a single provider call. [`GatewayError`] is what is left after the
//! gateway has absorbed the expected negative outcomes (not found, bad request);
//! only authentication, transient and unclassified failures remain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stable error classification shared by gateway failures and execution envelopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Precondition not met; execution was never attempted.
    ValidationError,
    /// Session invalid or expired.
    AuthError,
    /// Missing path. Normally absorbed as a negative result.
    NotFoundError,
    /// Network or rate-limit failure, retryable by the caller.
    TransientError,
    /// Anything else.
    UnknownError,
    /// Directory listing failed while looking for a previous report.
    DirectoryAccessError,
    /// Execution was cancelled at the executor boundary.
    CancelledError,
    /// Static configuration is incomplete or inconsistent.
    ConfigurationError,
}

impl ErrorKind {
    /// Returns the envelope name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::AuthError => "AuthError",
            ErrorKind::NotFoundError => "NotFoundError",
            ErrorKind::TransientError => "TransientError",
            ErrorKind::UnknownError => "UnknownError",
            ErrorKind::DirectoryAccessError => "DirectoryAccessError",
            ErrorKind::CancelledError => "CancelledError",
            ErrorKind::ConfigurationError => "ConfigurationError",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single storage provider call.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Path does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider rejected the request as malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Something already exists at the path.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A shared link already exists for the path.
    #[error("Shared link already exists: {0}")]
    SharedLinkAlreadyExists(String),

    /// Session token missing, invalid or expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Provider throttled the request.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Delay suggested by the provider, if any
        retry_after: Option<Duration>,
    },

    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider-side 5xx failure.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or summary
        message: String,
    },

    /// Response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unclassified failure.
    #[error("Client error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether the error means the addressed path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Whether the error is an expected negative outcome inside a workspace namespace.
    ///
    /// Relative paths that do not exist under a namespace surface from some
    /// endpoints as malformed lookups rather than misses.
    pub fn is_absent_in_namespace(&self) -> bool {
        matches!(self, ClientError::NotFound(_) | ClientError::BadRequest(_))
    }
}

/// Failure that escapes the gateway.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    /// Authentication failure.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Retryable failure (network, rate limiting, provider outage).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Unclassified failure.
    #[error("Storage error: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// Classification used in execution envelopes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Auth(_) => ErrorKind::AuthError,
            GatewayError::Transient(_) => ErrorKind::TransientError,
            GatewayError::Unknown(_) => ErrorKind::UnknownError,
        }
    }
}

impl From<ClientError> for GatewayError {
    fn from(err: ClientError) -> Self {
        let message = err.to_string();
        match err {
            ClientError::Unauthorized(_) => GatewayError::Auth(message),
            ClientError::RateLimited { .. }
            | ClientError::Network(_)
            | ClientError::Server { .. } => GatewayError::Transient(message),
            _ => GatewayError::Unknown(message),
        }
    }
}

/// Type alias for Result with GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
