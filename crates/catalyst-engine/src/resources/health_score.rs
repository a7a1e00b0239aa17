//! Device health score KPI thresholds.
//!
//! KPI definitions are built into the controller: they can be tuned but not
//! created or deleted.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};

use crate::acquire::{find_unique, normalize_name};
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{changed, project, require_id};
use crate::reverse::{ReverseField, Shape};
use crate::schema::{FieldSpec, Schema};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("device_family").required().choices(&[
            "ROUTER",
            "SWITCH_AND_HUB",
            "WIRELESS_CONTROLLER",
            "UNIFIED_AP",
            "WIRELESS_CLIENT",
            "WIRED_CLIENT",
        ]),
        FieldSpec::str("kpi_name").required(),
        FieldSpec::bool("include_for_overall_health"),
        FieldSpec::float("threshold_value"),
        FieldSpec::bool("synchronize_to_issue_threshold"),
    ])
    .required_one_of(&[
        "include_for_overall_health",
        "threshold_value",
        "synchronize_to_issue_threshold",
    ])
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("includeForOverallHealth", "include_for_overall_health"),
    FieldPair::new("thresholdValue", "threshold_value").numeric(),
    FieldPair::new("synchronizeToIssueThreshold", "synchronize_to_issue_threshold"),
];

const REVERSE_MAP: &[ReverseField] = &[
    ReverseField::new("device_family", "deviceFamily", Shape::Str),
    ReverseField::new("kpi_name", "name", Shape::Str),
    ReverseField::new("include_for_overall_health", "includeForOverallHealth", Shape::Bool),
    ReverseField::new("threshold_value", "thresholdValue", Shape::Float),
    ReverseField::new(
        "synchronize_to_issue_threshold",
        "synchronizeToIssueThreshold",
        Shape::Bool,
    ),
];

/// Health score KPIs, keyed by device family and KPI name.
///
/// KPI names match loosely: `cpu_utilization_threshold`,
/// `cpuUtilizationThreshold` and `CPU Utilization Threshold` are the same KPI.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScoreReconciler;

#[async_trait]
impl Reconciler for HealthScoreReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HealthScore
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn field_pairs(&self) -> &[FieldPair] {
        FIELD_PAIRS
    }

    fn reverse_map(&self) -> &[ReverseField] {
        REVERSE_MAP
    }

    fn supports_delete(&self) -> bool {
        false
    }

    fn describe(&self, desired: &Record) -> String {
        format!(
            "health_score {}/{}",
            desired.get_str("device_family").unwrap_or_default(),
            desired.get_str("kpi_name").unwrap_or_default()
        )
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let family = desired.get_str("device_family").unwrap_or_default();
        let kpi = normalize_name(desired.get_str("kpi_name").unwrap_or_default());
        let params = Record::new().with("deviceType", family);
        let candidates = ctx
            .list_all("devices", "get_health_score_definitions", &params)
            .await?;
        find_unique(&self.describe(desired), &candidates, |r| {
            let same_family = r
                .get_str("deviceFamily")
                .is_some_and(|f| f.eq_ignore_ascii_case(family));
            let same_kpi = ["name", "displayName"]
                .iter()
                .any(|field| r.get_str(field).is_some_and(|n| normalize_name(n) == kpi));
            same_family && same_kpi
        })
    }

    async fn create(&self, _ctx: &Context, desired: &Record) -> Result<Change> {
        Err(EngineError::MissingReference {
            what: "health score KPI",
            name: self.describe(desired),
        })
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        let params = Record::new()
            .with("id", require_id(current, "id", "update_health_score_definition")?)
            .with("payload", project(desired, FIELD_PAIRS).into_value());
        let mutation = ctx
            .mutate("devices", "update_health_score_definition", &params)
            .await?;
        Ok(changed(Operation::Updated, mutation))
    }

    async fn remove(&self, _ctx: &Context, _current: &Record, desired: &Record) -> Result<Change> {
        Err(EngineError::UnsupportedOperation(format!(
            "{} cannot be deleted",
            self.describe(desired)
        )))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list_all("devices", "get_health_score_definitions", &Record::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn something_must_be_tuned() {
        let err = HealthScoreReconciler
            .validate(&json!({"device_family": "ROUTER", "kpi_name": "cpu"}), "x")
            .unwrap_err();
        assert!(err.to_string().contains("one of the following is required"));
    }

    #[test]
    fn threshold_compares_numerically() {
        let current = Record::try_from(json!({
            "id": "k1", "name": "cpuUtilizationThreshold", "thresholdValue": 80,
            "includeForOverallHealth": true
        }))
        .unwrap();
        let desired = Record::try_from(json!({"threshold_value": 80.0})).unwrap();
        assert!(!HealthScoreReconciler.compare(&current, &desired).requires_update);

        let desired = Record::try_from(json!({"threshold_value": 90, "include_for_overall_health": true})).unwrap();
        assert_eq!(
            HealthScoreReconciler.compare(&current, &desired).differing_fields,
            ["threshold_value"]
        );
    }
}
