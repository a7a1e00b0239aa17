//! Common error types.
//!
//! [`ErrorKind`] is the user-facing classification carried in diagnostics;
//! [`CoreError`] covers failures inside this crate's own parsers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A controller version string could not be parsed.
    #[error("invalid controller version: {0}")]
    InvalidVersion(String),

    /// The resource kind is not one the engine knows how to reconcile.
    #[error("unknown resource kind: {0}")]
    UnknownResourceKind(String),

    /// The run state is not one of merged/present/deleted/absent/gathered.
    #[error("unknown state: {0}")]
    UnknownState(String),

    /// A value could not be turned into a record.
    #[error("expected an object, found {0}")]
    NotAnObject(String),
}

/// Stable classification of everything that can go wrong during a run.
///
/// The serialized form (`schema-violation`, `task-failed`, ...) is part of the
/// emitted aggregate and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The user document was rejected by a schema.
    SchemaViolation,
    /// An id and a natural key resolved to different records.
    InconsistentParameters,
    /// The controller is older than a requested resource supports.
    VersionUnsupported,
    /// Network or HTTP failure after the transport exhausted its retries.
    TransportError,
    /// The controller reported a task failure.
    TaskFailed,
    /// A task did not reach a terminal state before its deadline.
    TaskTimedOut,
    /// The record does not exist. Consumed internally as absence.
    NotFound,
    /// A natural key matched more than one controller record.
    MultipleMatches,
    /// A referenced site, template or device does not exist.
    MissingReference,
    /// The requested state is not supported by the resource.
    UnsupportedOperation,
    /// Post-run verification found the controller still differs.
    VerificationFailed,
    /// The record was skipped because the run was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Returns true if an error of this kind aborts the whole run.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::SchemaViolation
                | Self::InconsistentParameters
                | Self::VersionUnsupported
                | Self::UnsupportedOperation
        )
    }

    /// The kebab-case name used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaViolation => "schema-violation",
            Self::InconsistentParameters => "inconsistent-parameters",
            Self::VersionUnsupported => "version-unsupported",
            Self::TransportError => "transport-error",
            Self::TaskFailed => "task-failed",
            Self::TaskTimedOut => "task-timed-out",
            Self::NotFound => "not-found",
            Self::MultipleMatches => "multiple-matches",
            Self::MissingReference => "missing-reference",
            Self::UnsupportedOperation => "unsupported-operation",
            Self::VerificationFailed => "verification-failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::SchemaViolation).unwrap();
        assert_eq!(json, "\"schema-violation\"");
        let json = serde_json::to_string(&ErrorKind::TaskTimedOut).unwrap();
        assert_eq!(json, "\"task-timed-out\"");
    }

    #[test]
    fn display_matches_serialized_name() {
        for kind in [
            ErrorKind::InconsistentParameters,
            ErrorKind::VersionUnsupported,
            ErrorKind::MultipleMatches,
            ErrorKind::MissingReference,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.to_string());
        }
    }

    #[test]
    fn fatal_kinds() {
        assert!(ErrorKind::SchemaViolation.is_fatal());
        assert!(ErrorKind::VersionUnsupported.is_fatal());
        assert!(ErrorKind::InconsistentParameters.is_fatal());
        assert!(!ErrorKind::TaskFailed.is_fatal());
        assert!(!ErrorKind::TransportError.is_fatal());
        assert!(!ErrorKind::NotFound.is_fatal());
    }
}
