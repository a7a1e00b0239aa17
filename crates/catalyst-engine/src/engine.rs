//! The run driver.
//!
//! A run goes through fixed phases: parse, validate every record, check the
//! controller version for every kind in use, check explicit ids against
//! natural keys, then reconcile each record in dependency order. Nothing is
//! mutated unless the first phases pass. Outcomes are reported in the order
//! the records were declared, whatever order they ran in.

use std::collections::BTreeSet;
use std::sync::Arc;

use catalyst_core::{ErrorKind, Record, ResourceKind, State};
use catalyst_transport::Transport;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::context::Context;
use crate::document::{Entry, TaskDocument};
use crate::error::EngineError;
use crate::extract::Extractor;
use crate::outcome::{AggregateResult, Aggregator, Diagnostic, Operation, Outcome};
use crate::reconciler::{Change, Reconciler, Registry};

/// A validated record ready to run.
struct Planned {
    entry: Entry,
    reconciler: Arc<dyn Reconciler>,
    desired: Record,
    resource: String,
}

/// Runs task documents against one controller.
pub struct Engine {
    registry: Registry,
    ctx: Context,
}

impl Engine {
    /// Create an engine with every built-in resource.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        Self::with_registry(Registry::standard(), transport, config)
    }

    /// Create an engine with a custom registry.
    #[must_use]
    pub fn with_registry(registry: Registry, transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        Self {
            registry,
            ctx: Context::new(transport, config),
        }
    }

    /// The run context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    /// The resource registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run a document to completion.
    pub async fn run(&self, doc: &TaskDocument) -> AggregateResult {
        let (_cancel, never) = watch::channel(false);
        self.run_until(doc, never).await
    }

    /// Run a document, stopping between resources once `cancel` turns true.
    ///
    /// Errors never escape: every failure ends up in the aggregate.
    pub async fn run_until(&self, doc: &TaskDocument, cancel: watch::Receiver<bool>) -> AggregateResult {
        let mut agg = Aggregator::new();
        tracing::info!(state = %doc.state, verify = doc.config_verify, "Starting run");

        if doc.state == State::Gathered {
            match doc.extraction_request() {
                Ok(request) => {
                    let outcome = Extractor::new(&self.registry, &self.ctx).gather(&request).await;
                    agg.record(outcome);
                }
                Err(e) => agg.diagnose(Diagnostic::from_error("document", "parse", &e)),
            }
            return agg.finalize();
        }

        let entries = match doc.entries() {
            Ok(entries) => entries,
            Err(e) => {
                agg.diagnose(Diagnostic::from_error("document", "parse", &e));
                return agg.finalize();
            }
        };

        let Some(plan) = self.validate(entries, doc.state, &mut agg) else {
            return agg.finalize();
        };
        if !self.check_versions(&plan, &mut agg).await {
            return agg.finalize();
        }
        if !self.check_identities(&plan, &mut agg).await {
            return agg.finalize();
        }

        let outcomes = self.execute(&plan, doc.state, &cancel).await;

        if doc.config_verify {
            self.verify(&plan, &outcomes, doc.state, &mut agg).await;
        }
        for outcome in outcomes {
            agg.record(outcome);
        }
        agg.finalize()
    }

    /// Validate every record. Returns `None` if any was rejected.
    fn validate(&self, entries: Vec<Entry>, state: State, agg: &mut Aggregator) -> Option<Vec<Planned>> {
        let mut plan = Vec::with_capacity(entries.len());
        let mut rejected = false;

        for entry in entries {
            let Some(reconciler) = self.registry.get(entry.kind).cloned() else {
                agg.diagnose(
                    Diagnostic::new(
                        ErrorKind::UnsupportedOperation,
                        entry.kind.as_str(),
                        "validate",
                        format!("no reconciler registered for {}", entry.kind),
                    )
                    .at(entry.path.as_str()),
                );
                rejected = true;
                continue;
            };

            let desired = match reconciler.validate(&entry.raw, &entry.path) {
                Ok(desired) => desired,
                Err(EngineError::SchemaViolation(violations)) => {
                    for violation in violations {
                        agg.diagnose(
                            Diagnostic::new(
                                ErrorKind::SchemaViolation,
                                entry.kind.as_str(),
                                "validate",
                                violation.reason.as_str(),
                            )
                            .at(violation.path.as_str()),
                        );
                    }
                    rejected = true;
                    continue;
                }
                Err(e) => {
                    agg.diagnose(Diagnostic::from_error(entry.kind.as_str(), "validate", &e).at(entry.path.as_str()));
                    rejected = true;
                    continue;
                }
            };

            let resource = reconciler.describe(&desired);
            if state == State::Deleted && !reconciler.supports_delete() {
                agg.diagnose(
                    Diagnostic::new(
                        ErrorKind::UnsupportedOperation,
                        resource.as_str(),
                        "delete",
                        format!("{} does not support state deleted", entry.kind),
                    )
                    .at(entry.path.as_str()),
                );
                rejected = true;
                continue;
            }

            plan.push(Planned {
                entry,
                reconciler,
                desired,
                resource,
            });
        }

        (!rejected).then_some(plan)
    }

    /// Refuse the run if the controller is older than any kind in use.
    async fn check_versions(&self, plan: &[Planned], agg: &mut Aggregator) -> bool {
        let kinds: BTreeSet<ResourceKind> = plan.iter().map(|p| p.entry.kind).collect();
        if kinds.is_empty() {
            return true;
        }

        let actual = match self.ctx.transport().version().await {
            Ok(version) => version,
            Err(e) => {
                agg.diagnose(Diagnostic::from_error("controller", "version-check", &EngineError::from(e)));
                return false;
            }
        };
        tracing::info!(version = %actual, "Controller version");

        let mut supported = true;
        for kind in kinds {
            let Some(reconciler) = self.registry.get(kind) else {
                continue;
            };
            let required = reconciler.min_version();
            if actual < required {
                let error = EngineError::VersionUnsupported {
                    kind,
                    required,
                    actual,
                };
                agg.diagnose(Diagnostic::from_error(kind.as_str(), "version-check", &error));
                supported = false;
            }
        }
        supported
    }

    /// Look up every record that names an explicit id, failing the run if
    /// the id and the natural key disagree.
    ///
    /// Other lookup failures are left for the resource's own turn.
    async fn check_identities(&self, plan: &[Planned], agg: &mut Aggregator) -> bool {
        let mut consistent = true;
        for planned in plan.iter().filter(|p| p.desired.contains("id")) {
            let result = match planned.reconciler.resolve(&self.ctx, &planned.desired).await {
                Ok(resolved) => planned.reconciler.acquire(&self.ctx, &resolved).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e @ EngineError::InconsistentParameters(_)) = result {
                agg.diagnose(Diagnostic::from_error(&planned.resource, "identity-check", &e).at(planned.entry.path.as_str()));
                consistent = false;
            }
        }
        consistent
    }

    /// Reconcile every record in dependency order.
    ///
    /// The returned outcomes are in declaration order.
    async fn execute(&self, plan: &[Planned], state: State, cancel: &watch::Receiver<bool>) -> Vec<Outcome> {
        let mut order: Vec<&Planned> = plan.iter().collect();
        order.sort_by_key(|p| (p.entry.kind.rank(), p.reconciler.depth(&p.desired), p.entry.index));
        if state == State::Deleted {
            order.reverse();
        }

        let mut slots: Vec<Option<Outcome>> = vec![None; plan.len()];
        let mut stopped: Option<String> = None;

        for planned in order {
            if stopped.is_none() && *cancel.borrow() {
                tracing::warn!("Run cancelled");
                stopped = Some("run cancelled".to_string());
            }
            let outcome = match &stopped {
                Some(reason) => Outcome::failed(
                    planned.resource.as_str(),
                    Some(planned.entry.kind),
                    Diagnostic::new(
                        ErrorKind::Cancelled,
                        planned.resource.as_str(),
                        state.to_string(),
                        format!("skipped: {reason}"),
                    ),
                ),
                None => {
                    let outcome = self.reconcile(planned, state).await;
                    if let Some(fatal) = outcome.diagnostics.iter().find(|d| d.is_fatal()) {
                        stopped = Some(format!("{} failed fatally", fatal.resource));
                    }
                    outcome
                }
            };
            slots[planned.entry.index] = Some(outcome);
        }

        slots.into_iter().flatten().collect()
    }

    async fn reconcile(&self, planned: &Planned, state: State) -> Outcome {
        let kind = planned.entry.kind;
        let result = match state {
            State::Deleted => planned.reconciler.delete(&self.ctx, &planned.desired).await,
            _ => planned.reconciler.merge(&self.ctx, &planned.desired).await,
        };

        match result {
            Ok(change) => outcome_of(&planned.resource, kind, change),
            Err(e) => {
                tracing::error!(
                    resource = %planned.resource,
                    kind = %e.kind(),
                    error = %e,
                    "Resource failed"
                );
                let mut outcome = Outcome::failed(
                    planned.resource.as_str(),
                    Some(kind),
                    Diagnostic::from_error(&planned.resource, &state.to_string(), &e),
                );
                outcome.steps = e.completed_steps().to_vec();
                outcome
            }
        }
    }

    /// Re-acquire every reconciled record and record a diagnostic for any
    /// that still differs.
    async fn verify(&self, plan: &[Planned], outcomes: &[Outcome], state: State, agg: &mut Aggregator) {
        for (planned, outcome) in plan.iter().zip(outcomes) {
            if outcome.operation == Operation::Failed {
                continue;
            }
            let mismatch = match self.still_differs(planned, state).await {
                Ok(None) => continue,
                Ok(Some(mismatch)) => mismatch,
                Err(e) => format!("could not re-acquire: {e}"),
            };
            agg.diagnose(
                Diagnostic::new(ErrorKind::VerificationFailed, planned.resource.as_str(), "verify", mismatch)
                    .at(planned.entry.path.as_str()),
            );
        }
    }

    async fn still_differs(&self, planned: &Planned, state: State) -> crate::error::Result<Option<String>> {
        let reconciler = &planned.reconciler;
        let resolved = match reconciler.resolve(&self.ctx, &planned.desired).await {
            Ok(resolved) => resolved,
            Err(EngineError::MissingReference { .. }) if state == State::Deleted => return Ok(None),
            Err(e) => return Err(e),
        };
        let current = reconciler.acquire(&self.ctx, &resolved).await?;

        Ok(match (state, current) {
            (State::Deleted, Some(_)) => Some("resource still exists".to_string()),
            (State::Deleted, None) => None,
            (_, None) => Some("resource not found after reconcile".to_string()),
            (_, Some(current)) => {
                let result = reconciler.compare(&current, &resolved);
                result
                    .requires_update
                    .then(|| format!("fields still differ: {}", result.differing_fields.join(", ")))
            }
        })
    }
}

fn outcome_of(resource: &str, kind: ResourceKind, change: Change) -> Outcome {
    let mut outcome = Outcome::new(resource, Some(kind), change.operation);
    outcome.response = change.response;
    outcome.differing_fields = change.differing_fields;
    outcome.steps = change.steps;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_core::ControllerVersion;
    use catalyst_transport::{MockTransport, TransportError};
    use serde_json::json;

    fn engine(mock: &Arc<MockTransport>) -> Engine {
        Engine::new(mock.clone(), EngineConfig::default())
    }

    fn sites(mock: &MockTransport) {
        mock.respond(
            "site_design",
            "get_sites",
            json!({"response": [
                {"id": "G", "nameHierarchy": "Global", "type": "global"},
                {"id": "S1", "nameHierarchy": "Global/USA", "type": "area", "parentId": "G"}
            ]}),
        );
    }

    #[tokio::test]
    async fn schema_violations_stop_before_any_call() {
        let mock = Arc::new(MockTransport::new());
        let doc = TaskDocument::from_yaml(
            "config:\n  - ssid:\n      ssid_name: Corp\n      auth_type: WPA2_PERSONAL\n      color: blue\n",
        )
        .unwrap();

        let result = engine(&mock).run(&doc).await;
        assert!(result.failed);
        assert!(result.response.is_empty());
        assert!(result.has_diagnostic(ErrorKind::SchemaViolation));
        assert!(result.diagnostics.iter().any(|d| d.path.as_deref() == Some("config[0].ssid.color")));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn update_only_kinds_reject_deleted() {
        let mock = Arc::new(MockTransport::new());
        let doc = TaskDocument::from_yaml(
            "state: deleted\nconfig:\n  - health_score:\n      device_family: ROUTER\n      kpi_name: cpu\n      threshold_value: 80\n",
        )
        .unwrap();

        let result = engine(&mock).run(&doc).await;
        assert!(result.failed);
        assert!(result.has_diagnostic(ErrorKind::UnsupportedOperation));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn old_controller_is_refused() {
        let mock = Arc::new(MockTransport::new());
        mock.set_version(ControllerVersion::V2_3_7_6);
        let doc = TaskDocument::from_yaml(
            "config:\n  - user_issue:\n      name: BGP flap\n  - fabric_site:\n      site_name_hierarchy: Global/USA\n",
        )
        .unwrap();

        let result = engine(&mock).run(&doc).await;
        assert!(result.failed);
        let gated: Vec<&str> = result
            .diagnostics
            .iter()
            .filter(|d| d.kind == ErrorKind::VersionUnsupported)
            .map(|d| d.resource.as_str())
            .collect();
        assert_eq!(gated, ["user_issue"]);
        assert!(mock.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn conflicting_id_is_fatal() {
        let mock = Arc::new(MockTransport::new());
        sites(&mock);
        mock.respond(
            "sda",
            "get_fabric_sites",
            json!({"response": [
                {"id": "fs-1", "siteId": "S1", "authenticationProfileName": "No Authentication"},
                {"id": "fs-2", "siteId": "G", "authenticationProfileName": "No Authentication"}
            ]}),
        );
        let doc = TaskDocument::from_yaml(
            "config:\n  - fabric_site:\n      site_name_hierarchy: Global/USA\n      id: fs-2\n",
        )
        .unwrap();

        let result = engine(&mock).run(&doc).await;
        assert!(result.has_diagnostic(ErrorKind::InconsistentParameters));
        assert!(result.response.is_empty());
        assert!(mock.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn authentication_failure_stops_the_run() {
        let mock = Arc::new(MockTransport::new());
        sites(&mock);
        mock.on("sda", "get_fabric_sites", |_params: &Record| {
            Err(TransportError::Authentication("token rejected".into()))
        });
        let doc = TaskDocument::from_yaml(
            "config:\n  - fabric_site:\n      - site_name_hierarchy: Global/USA\n      - site_name_hierarchy: Global\n",
        )
        .unwrap();

        let result = engine(&mock).run(&doc).await;
        assert!(result.failed);
        let kinds: Vec<ErrorKind> = result
            .response
            .iter()
            .map(|o| o.diagnostics[0].kind)
            .collect();
        assert_eq!(kinds, [ErrorKind::TransportError, ErrorKind::Cancelled]);
        assert!(result.response[0].diagnostics[0].fatal);
        assert_eq!(mock.calls_to("get_fabric_sites").len(), 1);
    }

    #[tokio::test]
    async fn cancelled_runs_skip_remaining_records() {
        let mock = Arc::new(MockTransport::new());
        sites(&mock);
        let doc = TaskDocument::from_yaml(
            "config:\n  - fabric_site:\n      site_name_hierarchy: Global/USA\n",
        )
        .unwrap();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let result = engine(&mock).run_until(&doc, rx).await;

        assert_eq!(result.response.len(), 1);
        assert_eq!(result.response[0].operation, Operation::Failed);
        assert!(result.has_diagnostic(ErrorKind::Cancelled));
        assert!(mock.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn verification_reports_drift() {
        let mock = Arc::new(MockTransport::new());
        sites(&mock);
        // the controller accepts the update but keeps the old value
        mock.respond(
            "sda",
            "get_fabric_sites",
            json!({"response": [
                {"id": "fs-1", "siteId": "S1", "authenticationProfileName": "No Authentication", "isPubSubEnabled": false}
            ]}),
        );
        let doc = TaskDocument::from_yaml(
            "config_verify: true\nconfig:\n  - fabric_site:\n      site_name_hierarchy: Global/USA\n      authentication_profile_name: Closed Authentication\n",
        )
        .unwrap();

        let result = engine(&mock).run(&doc).await;
        assert_eq!(result.response[0].operation, Operation::Updated);
        assert!(result.changed);
        assert!(result.failed);
        let drift = result
            .diagnostics
            .iter()
            .find(|d| d.kind == ErrorKind::VerificationFailed)
            .unwrap();
        assert!(drift.message.contains("authentication_profile_name"));
    }
}
