//! The per-resource reconciliation contract and the registry of resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use catalyst_core::{ControllerVersion, Record, ResourceKind};
use serde_json::Value;

use crate::context::Context;
use crate::diff::{diff, DiffResult, FieldPair};
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::resources;
use crate::reverse::{self, Lookups, ReverseField};
use crate::schema::Schema;

/// What a merge or delete did to one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Resulting operation.
    pub operation: Operation,
    /// Controller response or resulting record.
    pub response: Option<Value>,
    /// Fields that differed before an update.
    pub differing_fields: Vec<String>,
    /// Completed steps of a multi-step change, in order.
    pub steps: Vec<String>,
}

impl Change {
    /// A change with no payload.
    #[must_use]
    pub const fn new(operation: Operation) -> Self {
        Self {
            operation,
            response: None,
            differing_fields: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Attach a response payload.
    #[must_use]
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Attach completed steps.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }
}

/// Reconciles one kind of controller resource.
///
/// Implementations supply the static tables (schema, field pairs, reverse
/// map) and the controller calls for acquisition and mutation. The merge
/// and delete flows are provided; composite resources override the pieces
/// they need.
#[async_trait]
pub trait Reconciler: Send + Sync {
    // =========================================================================
    // Static description
    // =========================================================================

    /// The resource kind.
    fn kind(&self) -> ResourceKind;

    /// Schema for desired records.
    fn schema(&self) -> &Schema;

    /// Field pairs driving the diff.
    fn field_pairs(&self) -> &[FieldPair];

    /// Reverse map used by the extractor.
    fn reverse_map(&self) -> &[ReverseField];

    /// Oldest controller release that supports this resource.
    fn min_version(&self) -> ControllerVersion {
        self.kind().min_version()
    }

    /// Whether `deleted` is a valid state for this resource.
    fn supports_delete(&self) -> bool {
        true
    }

    /// Human-readable name of a desired record, used in outcomes.
    fn describe(&self, desired: &Record) -> String;

    /// Tie-breaker inside a kind when ordering execution.
    ///
    /// Parents must sort before children on merge.
    fn depth(&self, _desired: &Record) -> usize {
        0
    }

    /// Validate a raw record, reporting violations under `path`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` with every violation found.
    fn validate(&self, raw: &Value, path: &str) -> Result<Record> {
        self.schema()
            .validate_at(raw, path)
            .map_err(EngineError::SchemaViolation)
    }

    /// Compare a current record against a resolved desired record.
    fn compare(&self, current: &Record, desired: &Record) -> DiffResult {
        diff(current, desired, self.field_pairs())
    }

    /// Rebuild a desired record from a current record.
    ///
    /// # Errors
    ///
    /// Returns the first transform failure.
    fn reverse(&self, current: &Record, lookups: &Lookups) -> std::result::Result<Record, String> {
        reverse::apply(current, self.reverse_map(), lookups)
    }

    // =========================================================================
    // Controller operations
    // =========================================================================

    /// Resolve references in a desired record (site names to ids, ...).
    ///
    /// # Errors
    ///
    /// Returns `MissingReference` if a referenced object does not exist.
    async fn resolve(&self, _ctx: &Context, desired: &Record) -> Result<Record> {
        Ok(desired.clone())
    }

    /// Find the current record for a resolved desired record.
    ///
    /// Absence is `Ok(None)`.
    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>>;

    /// Create the resource.
    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change>;

    /// Bring an existing resource in line with the desired record.
    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        diff: &DiffResult,
    ) -> Result<Change>;

    /// Remove an existing resource.
    async fn remove(&self, ctx: &Context, current: &Record, desired: &Record) -> Result<Change>;

    /// Every current record, for extraction.
    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>>;

    // =========================================================================
    // Flows
    // =========================================================================

    /// Converge toward present.
    ///
    /// # Errors
    ///
    /// Returns the first failure; completed steps of composite changes are
    /// carried in `StepFailed`.
    async fn merge(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let resolved = self.resolve(ctx, desired).await?;
        let Some(current) = self.acquire(ctx, &resolved).await? else {
            tracing::debug!(kind = %self.kind(), resource = %self.describe(desired), "Creating");
            // defaults only shape new resources, never updates
            let defaulted = self.schema().with_defaults(desired);
            let resolved = if &defaulted == desired {
                resolved
            } else {
                self.resolve(ctx, &defaulted).await?
            };
            return self.create(ctx, &resolved).await;
        };

        let result = self.compare(&current, &resolved);
        if !result.requires_update {
            return Ok(Change::new(Operation::NoChange).with_response(current.into_value()));
        }

        tracing::debug!(
            kind = %self.kind(),
            resource = %self.describe(desired),
            fields = ?result.differing_fields,
            "Updating"
        );
        let mut change = self.update(ctx, &current, &resolved, &result).await?;
        change.differing_fields = result.differing_fields;
        Ok(change)
    }

    /// Converge toward absent.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    async fn delete(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let resolved = match self.resolve(ctx, desired).await {
            Ok(resolved) => resolved,
            // a missing parent means the resource cannot exist either
            Err(EngineError::MissingReference { .. }) => {
                return Ok(Change::new(Operation::AlreadyAbsent));
            }
            Err(e) => return Err(e),
        };
        match self.acquire(ctx, &resolved).await? {
            None => Ok(Change::new(Operation::AlreadyAbsent)),
            Some(current) => self.remove(ctx, &current, &resolved).await,
        }
    }
}

/// Maps resource kinds to their reconcilers.
#[derive(Clone, Default)]
pub struct Registry {
    reconcilers: BTreeMap<ResourceKind, Arc<dyn Reconciler>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in resource.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(resources::site::SiteReconciler));
        registry.register(Arc::new(resources::auth_server::AuthServerReconciler));
        registry.register(Arc::new(resources::fabric_transit::FabricTransitReconciler));
        registry.register(Arc::new(resources::fabric::FabricSiteReconciler));
        registry.register(Arc::new(resources::fabric::FabricZoneReconciler));
        registry.register(Arc::new(resources::ssid::SsidReconciler));
        registry.register(Arc::new(resources::switch_profile::SwitchProfileReconciler));
        registry.register(Arc::new(resources::health_score::HealthScoreReconciler));
        registry.register(Arc::new(resources::issues::UserIssueReconciler));
        registry.register(Arc::new(resources::issues::SystemIssueReconciler));
        registry.register(Arc::new(resources::icap::IcapReconciler));
        registry
    }

    /// Register a reconciler, replacing any previous one for its kind.
    pub fn register(&mut self, reconciler: Arc<dyn Reconciler>) {
        self.reconcilers.insert(reconciler.kind(), reconciler);
    }

    /// The reconciler for a kind.
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn Reconciler>> {
        self.reconcilers.get(&kind)
    }

    /// Registered kinds in merge order.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.reconcilers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_kind() {
        let registry = Registry::standard();
        for kind in ResourceKind::ALL {
            let reconciler = registry.get(kind).unwrap();
            assert_eq!(reconciler.kind(), kind);
            assert_eq!(reconciler.min_version(), kind.min_version());
            assert!(!reconciler.schema().fields().is_empty(), "{kind} has no schema");
            assert!(!reconciler.field_pairs().is_empty(), "{kind} has no field pairs");
        }
        assert_eq!(registry.kinds().count(), ResourceKind::ALL.len());
    }

    #[test]
    fn update_only_kinds_refuse_delete() {
        let registry = Registry::standard();
        let refusing: Vec<ResourceKind> = ResourceKind::ALL
            .into_iter()
            .filter(|k| !registry.get(*k).unwrap().supports_delete())
            .collect();
        assert_eq!(refusing, [ResourceKind::HealthScore, ResourceKind::SystemIssue]);
    }

    #[test]
    fn extractable_kinds_have_reverse_maps() {
        let registry = Registry::standard();
        for kind in ResourceKind::ALL.into_iter().filter(|k| k.component().is_some()) {
            assert!(
                !registry.get(kind).unwrap().reverse_map().is_empty(),
                "{kind} has no reverse map"
            );
        }
    }
}
