//! Per-resource outcomes and the run-wide aggregate.

use std::fmt;

use catalyst_core::{ErrorKind, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// What happened to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// The resource was created.
    Created,
    /// The resource was changed.
    Updated,
    /// The resource already matched.
    NoChange,
    /// The resource was removed.
    Deleted,
    /// The resource was already gone.
    AlreadyAbsent,
    /// Reconciliation failed.
    Failed,
}

impl Operation {
    /// Returns true if the controller was changed.
    #[must_use]
    pub const fn is_change(self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Deleted)
    }

    /// The kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::NoChange => "no-change",
            Self::Deleted => "deleted",
            Self::AlreadyAbsent => "already-absent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error attached to an outcome or to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Classification.
    pub kind: ErrorKind,
    /// Resource the error concerns.
    pub resource: String,
    /// Operation that was attempted.
    pub operation: String,
    /// Human-readable message, with the controller's reason when available.
    pub message: String,
    /// Field path, for schema violations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The run stops after this diagnostic.
    #[serde(default)]
    pub fatal: bool,
}

impl Diagnostic {
    /// Create a diagnostic.
    #[must_use]
    pub fn new(
        kind: ErrorKind,
        resource: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource: resource.into(),
            operation: operation.into(),
            message: message.into(),
            path: None,
            fatal: kind.is_fatal(),
        }
    }

    /// Build a diagnostic from an engine error.
    #[must_use]
    pub fn from_error(resource: &str, operation: &str, error: &EngineError) -> Self {
        let operation = error.failed_step().unwrap_or(operation);
        let mut diagnostic = Self::new(error.kind(), resource, operation, error.to_string());
        diagnostic.fatal = error.is_fatal();
        diagnostic
    }

    /// Attach a field path.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns true if the diagnostic invalidates the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.fatal
    }
}

/// The result of reconciling one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Resource description, e.g. `ssid Corp @ Global/USA`.
    pub resource: String,
    /// Resource kind, when the outcome concerns a declared resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResourceKind>,
    /// What happened.
    pub operation: Operation,
    /// Errors encountered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    /// Controller response or resulting record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Fields that differed before an update.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differing_fields: Vec<String>,
    /// Completed steps of a multi-step change.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}

impl Outcome {
    /// A successful outcome.
    #[must_use]
    pub fn new(resource: impl Into<String>, kind: Option<ResourceKind>, operation: Operation) -> Self {
        Self {
            resource: resource.into(),
            kind,
            operation,
            diagnostics: Vec::new(),
            response: None,
            differing_fields: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// A failed outcome carrying one diagnostic.
    #[must_use]
    pub fn failed(resource: impl Into<String>, kind: Option<ResourceKind>, diagnostic: Diagnostic) -> Self {
        let mut outcome = Self::new(resource, kind, Operation::Failed);
        outcome.diagnostics.push(diagnostic);
        outcome
    }

    /// Attach a response payload.
    #[must_use]
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }
}

/// The emitted run result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// True iff at least one outcome changed the controller.
    pub changed: bool,
    /// Outcomes in declaration order.
    pub response: Vec<Outcome>,
    /// Summary message.
    pub msg: String,
    /// Every diagnostic, run-level and per-outcome.
    pub diagnostics: Vec<Diagnostic>,
    /// True if any outcome failed or a fatal diagnostic was recorded.
    pub failed: bool,
}

impl AggregateResult {
    /// Outcomes with a given operation.
    pub fn outcomes_with(&self, operation: Operation) -> impl Iterator<Item = &Outcome> {
        self.response.iter().filter(move |o| o.operation == operation)
    }

    /// Returns true if a diagnostic of `kind` was recorded.
    #[must_use]
    pub fn has_diagnostic(&self, kind: ErrorKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

/// Accumulates outcomes for one run.
#[derive(Debug, Default)]
pub struct Aggregator {
    outcomes: Vec<Outcome>,
    diagnostics: Vec<Diagnostic>,
}

impl Aggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource outcome.
    pub fn record(&mut self, outcome: Outcome) {
        tracing::info!(
            resource = %outcome.resource,
            operation = %outcome.operation,
            "Resource reconciled"
        );
        self.outcomes.push(outcome);
    }

    /// Record a run-level diagnostic.
    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(
            kind = %diagnostic.kind,
            resource = %diagnostic.resource,
            message = %diagnostic.message,
            "Run diagnostic"
        );
        self.diagnostics.push(diagnostic);
    }

    /// True iff at least one recorded outcome changed the controller.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|o| o.operation.is_change())
    }

    /// True if any outcome failed or a fatal diagnostic was recorded.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(|o| o.operation == Operation::Failed)
            || self.diagnostics.iter().any(|d| {
                d.is_fatal() || d.kind == ErrorKind::VerificationFailed
            })
    }

    /// Recorded outcomes so far.
    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Produce the final result.
    #[must_use]
    pub fn finalize(self) -> AggregateResult {
        let changed = self.changed();
        let failed = self.failed();
        let msg = self.summary(failed);

        let mut diagnostics = self.diagnostics;
        diagnostics.extend(
            self.outcomes
                .iter()
                .flat_map(|o| o.diagnostics.iter().cloned()),
        );

        AggregateResult {
            changed,
            response: self.outcomes,
            msg,
            diagnostics,
            failed,
        }
    }

    fn summary(&self, failed: bool) -> String {
        const ORDER: [Operation; 6] = [
            Operation::Created,
            Operation::Updated,
            Operation::Deleted,
            Operation::NoChange,
            Operation::AlreadyAbsent,
            Operation::Failed,
        ];

        if self.outcomes.is_empty() {
            return match self.diagnostics.first() {
                Some(first) => format!("run aborted: {}", first.message),
                None => "nothing to do".to_string(),
            };
        }

        let counts: Vec<String> = ORDER
            .iter()
            .filter_map(|op| {
                let n = self.outcomes.iter().filter(|o| o.operation == *op).count();
                (n > 0).then(|| format!("{n} {op}"))
            })
            .collect();
        let prefix = if failed { "completed with errors" } else { "completed" };
        format!(
            "{prefix}: {} resource(s) processed ({})",
            self.outcomes.len(),
            counts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_is_derived_from_outcomes() {
        let mut agg = Aggregator::new();
        agg.record(Outcome::new("ssid Corp", Some(ResourceKind::Ssid), Operation::NoChange));
        agg.record(Outcome::new("site Global/USA", Some(ResourceKind::Site), Operation::AlreadyAbsent));
        assert!(!agg.changed());

        agg.record(Outcome::new("fabric_site Global/USA", Some(ResourceKind::FabricSite), Operation::Updated));
        assert!(agg.changed());

        let result = agg.finalize();
        assert!(result.changed);
        assert!(!result.failed);
        assert_eq!(result.response.len(), 3);
        assert!(result.msg.contains("1 updated"));
    }

    #[test]
    fn failures_mark_the_run_failed() {
        let mut agg = Aggregator::new();
        let diag = Diagnostic::new(ErrorKind::TaskFailed, "ssid Corp", "create", "task t failed: x");
        agg.record(Outcome::failed("ssid Corp", Some(ResourceKind::Ssid), diag));
        let result = agg.finalize();
        assert!(result.failed);
        assert!(!result.changed);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.has_diagnostic(ErrorKind::TaskFailed));
    }

    #[test]
    fn fatality_follows_the_error() {
        use catalyst_transport::TransportError;

        let auth = EngineError::Transport(TransportError::Authentication("expired".into()));
        let diag = Diagnostic::from_error("fabric_site Global/USA", "merged", &auth);
        assert_eq!(diag.kind, ErrorKind::TransportError);
        assert!(diag.is_fatal());

        let task = Diagnostic::new(ErrorKind::TaskFailed, "ssid Corp", "create", "x");
        assert!(!task.is_fatal());
    }

    #[test]
    fn fatal_run_diagnostic_without_outcomes() {
        let mut agg = Aggregator::new();
        agg.diagnose(Diagnostic::new(
            ErrorKind::VersionUnsupported,
            "icap",
            "version-check",
            "icap requires controller 2.3.7.9 or newer, found 2.3.7.6",
        ));
        let result = agg.finalize();
        assert!(result.failed);
        assert!(result.msg.starts_with("run aborted"));
    }

    #[test]
    fn operations_serialize_kebab_case() {
        let json = serde_json::to_string(&Operation::AlreadyAbsent).unwrap();
        assert_eq!(json, "\"already-absent\"");
        let outcome = Outcome::new("x", None, Operation::NoChange);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["operation"], "no-change");
        assert!(value.get("diagnostics").is_none());
    }
}
