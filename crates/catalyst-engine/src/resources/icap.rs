//! Intelligent capture (ICAP) configurations.
//!
//! Captures are deployed in two steps: a configuration preview is created,
//! then the preview is deployed. A failed deploy discards the preview so no
//! half-applied capture is left behind.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};
use serde_json::Value;

use crate::context::{Context, Mutation};
use crate::diff::{DiffResult, FieldPair};
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{carry_over, changed, project, require_id};
use crate::reverse::ReverseField;
use crate::schema::{FieldSpec, FieldType, Schema};

const CREATE_STEP: &str = "create preview";
const DEPLOY_STEP: &str = "deploy preview";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("capture_type")
            .required()
            .choices(&["FULL", "ONBOARDING", "OTA", "RFSTATS", "ANOMALY"]),
        FieldSpec::int("capture_duration_minutes")
            .range(1, 10080)
            .default(30),
        FieldSpec::str("client_mac"),
        FieldSpec::str("wlc_id"),
        FieldSpec::str("ap_id"),
        FieldSpec::list("slot", FieldType::Int),
        FieldSpec::str("ota_band").choices(&["2.4GHz", "5GHz", "6GHz"]),
        FieldSpec::int("ota_channel"),
        FieldSpec::int("ota_channel_width").range(20, 320),
        FieldSpec::str("id"),
    ])
    .required_if("capture_type", "FULL", &["client_mac", "wlc_id"])
    .required_if("capture_type", "ONBOARDING", &["client_mac", "wlc_id"])
    .required_if("capture_type", "OTA", &["ap_id", "wlc_id", "slot", "ota_band"])
    .required_if("capture_type", "RFSTATS", &["ap_id", "wlc_id"])
    .required_if("capture_type", "ANOMALY", &["ap_id", "wlc_id"])
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("captureType", "capture_type").case_insensitive(),
    FieldPair::new("durationInMins", "capture_duration_minutes").numeric(),
    FieldPair::new("clientMac", "client_mac").case_insensitive(),
    FieldPair::new("wlcId", "wlc_id"),
    FieldPair::new("apId", "ap_id"),
    FieldPair::new("slot", "slot"),
    FieldPair::new("otaBand", "ota_band").case_insensitive(),
    FieldPair::new("otaChannel", "ota_channel").numeric(),
    FieldPair::new("otaChannelWidth", "ota_channel_width").numeric(),
];

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

/// The preview id reported by the create task.
///
/// Some releases return the task data as a JSON string rather than an
/// object; both are accepted.
fn preview_activity_id(mutation: &Mutation) -> Option<String> {
    let from = |value: &Value| {
        let parsed;
        let object = match value {
            Value::String(text) => {
                parsed = serde_json::from_str::<Value>(text).ok()?;
                &parsed
            }
            other => other,
        };
        object
            .get("previewActivityId")
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    mutation
        .task_data()
        .and_then(from)
        .or_else(|| mutation.response.get("response").and_then(from))
}

/// ICAP captures, keyed by capture type and target.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcapReconciler;

#[async_trait]
impl Reconciler for IcapReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Icap
    }

    fn schema(&self) -> &Schema {
        &SCHEMA
    }

    fn field_pairs(&self) -> &[FieldPair] {
        FIELD_PAIRS
    }

    fn reverse_map(&self) -> &[ReverseField] {
        &[]
    }

    fn describe(&self, desired: &Record) -> String {
        let target = desired
            .get_str("client_mac")
            .or_else(|| desired.get_str("ap_id"))
            .unwrap_or_default();
        format!(
            "icap {} {target}",
            desired.get_str("capture_type").unwrap_or_default()
        )
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let capture_type = desired.get_str("capture_type").unwrap_or_default();
        let params = Record::new().with("captureType", capture_type);
        let candidates = ctx.list_all("sensors", "get_icap_configs", &params).await?;
        crate::acquire::resolve_identity(
            &self.describe(desired),
            "id",
            desired.get_str("id"),
            &candidates,
            |r| {
                same_text(r.get_str("captureType"), Some(capture_type))
                    && same_text(r.get_str("clientMac"), desired.get_str("client_mac"))
                    && same_text(r.get_str("apId"), desired.get_str("ap_id"))
            },
        )
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let mut completed = Vec::new();

        let params = Record::new().with(
            "payload",
            Value::Array(vec![project(desired, FIELD_PAIRS).into_value()]),
        );
        let preview = ctx
            .mutate("sensors", "create_icap_preview", &params)
            .await
            .map_err(|e| EngineError::at_step(CREATE_STEP, &completed, e))?;
        let Some(activity) = preview_activity_id(&preview) else {
            return Err(EngineError::at_step(
                CREATE_STEP,
                &completed,
                EngineError::UnexpectedResponse {
                    operation: "create_icap_preview".to_string(),
                    message: "no previewActivityId in task data".to_string(),
                },
            ));
        };
        completed.push(CREATE_STEP.to_string());

        let params = Record::new().with("preview_activity_id", activity.as_str());
        match ctx.mutate("sensors", "deploy_icap_preview", &params).await {
            Ok(deployed) => {
                completed.push(DEPLOY_STEP.to_string());
                Ok(changed(Operation::Created, deployed).with_steps(completed))
            }
            Err(e) => {
                tracing::warn!(
                    preview_activity_id = %activity,
                    error = %e,
                    "ICAP deploy failed, discarding preview"
                );
                if let Err(discard) = ctx
                    .mutate("sensors", "discard_icap_preview", &params)
                    .await
                {
                    tracing::warn!(
                        preview_activity_id = %activity,
                        error = %discard,
                        "Failed to discard ICAP preview"
                    );
                }
                Err(EngineError::at_step(DEPLOY_STEP, &completed, e))
            }
        }
    }

    /// Captures cannot be edited in place; the old one is removed first.
    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        self.remove(ctx, current, desired)
            .await
            .map_err(|e| EngineError::at_step("remove capture", &[], e))?;
        let replacement = SCHEMA.with_defaults(&carry_over(current, desired, FIELD_PAIRS));
        let mut change = self.create(ctx, &replacement).await.map_err(|e| match e {
            EngineError::StepFailed {
                step,
                mut completed,
                source,
            } => {
                completed.insert(0, "remove capture".to_string());
                EngineError::StepFailed {
                    step,
                    completed,
                    source,
                }
            }
            other => other,
        })?;
        change.operation = Operation::Updated;
        change.steps.insert(0, "remove capture".to_string());
        Ok(change)
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        let params = Record::new().with("id", require_id(current, "id", "remove_icap_config")?);
        let mutation = ctx
            .mutate("sensors", "remove_icap_config", &params)
            .await?;
        Ok(changed(Operation::Deleted, mutation))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list_all("sensors", "get_icap_configs", &Record::new())
            .await
    }
}
