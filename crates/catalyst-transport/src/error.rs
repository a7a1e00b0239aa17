//! Transport error types.

use thiserror::Error;

/// A result type using `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while talking to the controller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The controller rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The controller answered with a non-success status.
    #[error("controller returned {status} for {operation}: {message}")]
    Http {
        /// Operation that was attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Controller-provided reason, verbatim when available.
        message: String,
    },

    /// The request never produced a response.
    #[error("request for {operation} failed after {attempts} attempts: {message}")]
    Connection {
        /// Operation that was attempted.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last underlying error.
        message: String,
    },

    /// No route is known for the family/operation pair.
    #[error("unknown operation {family}.{operation}")]
    UnknownOperation {
        /// API family.
        family: String,
        /// Operation name.
        operation: String,
    },

    /// A path placeholder had no matching parameter.
    #[error("missing path parameter '{parameter}' for {operation}")]
    MissingParameter {
        /// Operation that was attempted.
        operation: String,
        /// Name of the missing parameter.
        parameter: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response for {operation}: {message}")]
    Decode {
        /// Operation that was attempted.
        operation: String,
        /// Decoder message.
        message: String,
    },

    /// The transport could not be configured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Returns true if retrying the same request might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(*status, 429 | 502 | 503 | 504),
            Self::Connection { .. } => true,
            _ => false,
        }
    }

    /// Returns true if the error invalidates the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Config(_))
    }

    /// The HTTP status code, if the controller answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
