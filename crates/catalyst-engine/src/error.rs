//! Error types for the reconciliation engine.

use catalyst_core::{ControllerVersion, CoreError, ErrorKind, ResourceKind};
use catalyst_transport::TransportError;
use thiserror::Error;

use crate::schema::Violation;

/// A result type using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while reconciling resources.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The user document was rejected by a schema.
    #[error("schema violation: {}", join_violations(.0))]
    SchemaViolation(Vec<Violation>),

    /// An id and a natural key resolved to different records.
    #[error("inconsistent parameters: {0}")]
    InconsistentParameters(String),

    /// The controller is older than the resource supports.
    #[error("{kind} requires controller {required} or newer, found {actual}")]
    VersionUnsupported {
        /// The resource kind that was requested.
        kind: ResourceKind,
        /// Minimum release the resource supports.
        required: ControllerVersion,
        /// Release the controller reported.
        actual: ControllerVersion,
    },

    /// The transport gave up on a request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The controller reported a task failure.
    #[error("task {task_id} failed: {reason}")]
    TaskFailed {
        /// Task identifier.
        task_id: String,
        /// Controller-provided reason.
        reason: String,
        /// Controller-provided error code.
        code: Option<String>,
    },

    /// A task did not finish before its deadline.
    #[error("task {task_id} did not finish within {waited_secs}s")]
    TaskTimedOut {
        /// Task identifier.
        task_id: String,
        /// How long the tracker waited.
        waited_secs: u64,
    },

    /// A task kept reporting an unrecognised state.
    #[error("task {task_id} reported no recognisable state for {polls} polls")]
    TaskStatusUnknown {
        /// Task identifier.
        task_id: String,
        /// Consecutive polls without a recognisable state.
        polls: u32,
    },

    /// A natural key matched several controller records.
    #[error("{resource} matches {count} controller records")]
    MultipleMatches {
        /// Resource description.
        resource: String,
        /// Number of matches.
        count: usize,
    },

    /// A referenced object does not exist on the controller.
    #[error("{what} '{name}' does not exist")]
    MissingReference {
        /// What was referenced (site, template, KPI, ...).
        what: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// The resource does not support the requested operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The controller answered in a shape the engine cannot use.
    #[error("unexpected response from {operation}: {message}")]
    UnexpectedResponse {
        /// Operation that answered.
        operation: String,
        /// What was wrong.
        message: String,
    },

    /// One step of a multi-step change failed.
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        /// Step that failed.
        step: String,
        /// Steps that completed before the failure.
        completed: Vec<String>,
        /// Underlying failure.
        #[source]
        source: Box<EngineError>,
    },

    /// The declarative document is malformed.
    #[error("invalid document: {0}")]
    Document(String),

    /// Core value parsing error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Output could not be written.
    #[error("failed to write {path}: {message}")]
    Output {
        /// Target path.
        path: String,
        /// Underlying I/O or encoding error.
        message: String,
    },
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    /// Build a `StepFailed` wrapping `source`.
    #[must_use]
    pub fn at_step(step: impl Into<String>, completed: &[String], source: Self) -> Self {
        Self::StepFailed {
            step: step.into(),
            completed: completed.to_vec(),
            source: Box::new(source),
        }
    }

    /// The stable classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaViolation(_) | Self::Document(_) | Self::Core(_) => {
                ErrorKind::SchemaViolation
            }
            Self::InconsistentParameters(_) => ErrorKind::InconsistentParameters,
            Self::VersionUnsupported { .. } => ErrorKind::VersionUnsupported,
            Self::Transport(_)
            | Self::TaskStatusUnknown { .. }
            | Self::UnexpectedResponse { .. }
            | Self::Output { .. } => ErrorKind::TransportError,
            Self::TaskFailed { .. } => ErrorKind::TaskFailed,
            Self::TaskTimedOut { .. } => ErrorKind::TaskTimedOut,
            Self::MultipleMatches { .. } => ErrorKind::MultipleMatches,
            Self::MissingReference { .. } => ErrorKind::MissingReference,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::StepFailed { source, .. } => source.kind(),
        }
    }

    /// Returns true if this error must stop the whole run.
    ///
    /// Authentication failures are fatal even though they arrive as
    /// transport errors.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            Self::StepFailed { source, .. } => source.is_fatal(),
            other => other.kind().is_fatal(),
        }
    }

    /// Steps that completed before a multi-step change failed.
    #[must_use]
    pub fn completed_steps(&self) -> &[String] {
        match self {
            Self::StepFailed { completed, .. } => completed,
            _ => &[],
        }
    }

    /// The step that failed, if the error came from a multi-step change.
    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_fatality() {
        let err = EngineError::SchemaViolation(vec![Violation::new("ssid.auth_type", "bad")]);
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("ssid.auth_type: bad"));

        let err = EngineError::TaskFailed {
            task_id: "t".into(),
            reason: "boom".into(),
            code: None,
        };
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
        assert!(!err.is_fatal());
    }

    #[test]
    fn authentication_is_fatal() {
        let err = EngineError::from(TransportError::Authentication("denied".into()));
        assert_eq!(err.kind(), ErrorKind::TransportError);
        assert!(err.is_fatal());

        let err = EngineError::from(TransportError::Http {
            operation: "get_sites".into(),
            status: 500,
            message: "oops".into(),
        });
        assert!(!err.is_fatal());
    }

    #[test]
    fn step_failures_delegate() {
        let inner = EngineError::TaskFailed {
            task_id: "b".into(),
            reason: "deploy rejected".into(),
            code: Some("ICAP01".into()),
        };
        let err = EngineError::at_step("deploy preview", &["create preview".to_string()], inner);
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
        assert_eq!(err.failed_step(), Some("deploy preview"));
        assert_eq!(err.completed_steps(), ["create preview".to_string()]);
        assert!(err.to_string().contains("deploy rejected"));
    }
}
