//! Assurance issue definitions: user-defined syslog issues and the
//! trigger settings of built-in system issues.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};
use serde_json::{Map, Value};

use crate::acquire::{find_unique, resolve_identity};
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{carry_over, changed, named, project, require_id};
use crate::reverse::{Lookups, ReverseField, Shape, Transform};
use crate::schema::{FieldSpec, Schema};

const PRIORITIES: &[&str] = &["P1", "P2", "P3", "P4"];

// =============================================================================
// User-defined issues
// =============================================================================

static USER_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("name").required().max_len(128),
        FieldSpec::str("description"),
        FieldSpec::records(
            "rules",
            Schema::new(vec![
                FieldSpec::int("severity").range(0, 7),
                FieldSpec::str("facility"),
                FieldSpec::str("mnemonic").required(),
                FieldSpec::str("pattern").required(),
                FieldSpec::int("occurrences").range(1, 60).default(1),
                FieldSpec::int("duration_in_minutes").range(1, 60).default(1),
            ]),
        ),
        FieldSpec::bool("is_enabled").default(true),
        FieldSpec::str("priority").choices(PRIORITIES).default("P1"),
        FieldSpec::bool("is_notification_enabled").default(false),
        FieldSpec::str("id"),
    ])
});

/// Rule fields, desired name to controller name.
const RULE_KEYS: &[(&str, &str)] = &[
    ("severity", "severity"),
    ("facility", "facility"),
    ("mnemonic", "mnemonic"),
    ("pattern", "pattern"),
    ("occurrences", "occurrences"),
    ("duration_in_minutes", "durationInMinutes"),
];

const USER_PAIRS: &[FieldPair] = &[
    FieldPair::new("name", "name"),
    FieldPair::new("description", "description"),
    FieldPair::new("rules", "rules").keyed("mnemonic", true),
    FieldPair::new("isEnabled", "is_enabled"),
    FieldPair::new("priority", "priority").case_insensitive(),
    FieldPair::new("isNotificationEnabled", "is_notification_enabled"),
];

const USER_REVERSE: &[ReverseField] = &[
    ReverseField::new("name", "name", Shape::Str),
    ReverseField::new("description", "description", Shape::Str),
    ReverseField::new("rules", "rules", Shape::List).with(Transform::Custom(rules_from_controller)),
    ReverseField::new("is_enabled", "isEnabled", Shape::Bool),
    ReverseField::new("priority", "priority", Shape::Str),
    ReverseField::new("is_notification_enabled", "isNotificationEnabled", Shape::Bool),
];

fn convert_rules(rules: &[Value], to_controller: bool) -> Value {
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                let mut converted = Map::new();
                for (desired, controller) in RULE_KEYS {
                    let (from, to) = if to_controller {
                        (desired, controller)
                    } else {
                        (controller, desired)
                    };
                    if let Some(value) = rule.get(*from).filter(|v| !v.is_null()) {
                        converted.insert((*to).to_string(), value.clone());
                    }
                }
                Value::Object(converted)
            })
            .collect(),
    )
}

fn rules_from_controller(value: &Value, _: &Lookups) -> std::result::Result<Value, String> {
    value
        .as_array()
        .map(|rules| convert_rules(rules, false))
        .ok_or_else(|| format!("expected a list of rules, found {value}"))
}

/// User-defined issues, keyed by name.
///
/// The rule list is treated as complete: rules missing from the desired
/// record are removed on update.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserIssueReconciler;

#[async_trait]
impl Reconciler for UserIssueReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::UserIssue
    }

    fn schema(&self) -> &Schema {
        &USER_SCHEMA
    }

    fn field_pairs(&self) -> &[FieldPair] {
        USER_PAIRS
    }

    fn reverse_map(&self) -> &[ReverseField] {
        USER_REVERSE
    }

    fn describe(&self, desired: &Record) -> String {
        format!("user_issue {}", desired.get_str("name").unwrap_or_default())
    }

    /// Rules are compared and sent in controller field names.
    async fn resolve(&self, _ctx: &Context, desired: &Record) -> Result<Record> {
        let mut resolved = desired.clone();
        if let Some(rules) = desired.get_list("rules") {
            resolved.insert("rules", convert_rules(rules, true));
        }
        Ok(resolved)
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let name = desired.get_str("name").unwrap_or_default();
        let params = Record::new().with("name", name);
        let candidates = ctx
            .list_all("issues", "get_issue_definitions", &params)
            .await?;
        resolve_identity(
            &self.describe(desired),
            "id",
            desired.get_str("id"),
            &candidates,
            named("name", name),
        )
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let params = Record::new().with("payload", project(desired, USER_PAIRS).into_value());
        let mutation = ctx
            .mutate("issues", "create_issue_definition", &params)
            .await?;
        Ok(changed(Operation::Created, mutation))
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        let params = Record::new()
            .with("id", require_id(current, "id", "update_issue_definition")?)
            .with(
                "payload",
                project(&carry_over(current, desired, USER_PAIRS), USER_PAIRS).into_value(),
            );
        let mutation = ctx
            .mutate("issues", "update_issue_definition", &params)
            .await?;
        Ok(changed(Operation::Updated, mutation))
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        let params = Record::new().with("id", require_id(current, "id", "delete_issue_definition")?);
        let mutation = ctx
            .mutate("issues", "delete_issue_definition", &params)
            .await?;
        Ok(changed(Operation::Deleted, mutation))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list_all("issues", "get_issue_definitions", &Record::new())
            .await
    }
}

// =============================================================================
// System issue settings
// =============================================================================

static SYSTEM_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("name").required(),
        FieldSpec::str("device_type").required().choices(&[
            "ROUTER",
            "SWITCH_AND_HUB",
            "WIRELESS_CONTROLLER",
            "UNIFIED_AP",
            "WIRELESS_CLIENT",
            "WIRED_CLIENT",
        ]),
        FieldSpec::bool("synchronize_to_health_threshold"),
        FieldSpec::str("priority").choices(PRIORITIES),
        FieldSpec::bool("issue_enabled"),
        FieldSpec::float("threshold_value"),
    ])
});

const SYSTEM_PAIRS: &[FieldPair] = &[
    FieldPair::new("synchronizeToHealthThreshold", "synchronize_to_health_threshold"),
    FieldPair::new("priority", "priority").case_insensitive(),
    FieldPair::new("issueEnabled", "issue_enabled"),
    FieldPair::new("thresholdValue", "threshold_value").numeric(),
];

const SYSTEM_REVERSE: &[ReverseField] = &[
    ReverseField::new("name", "displayName", Shape::Str),
    ReverseField::new("device_type", "deviceType", Shape::Str),
    ReverseField::new(
        "synchronize_to_health_threshold",
        "synchronizeToHealthThreshold",
        Shape::Bool,
    ),
    ReverseField::new("priority", "priority", Shape::Str),
    ReverseField::new("issue_enabled", "issueEnabled", Shape::Bool),
    ReverseField::new("threshold_value", "thresholdValue", Shape::Float),
];

/// Built-in issue trigger settings, keyed by name and device type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIssueReconciler;

#[async_trait]
impl Reconciler for SystemIssueReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SystemIssue
    }

    fn schema(&self) -> &Schema {
        &SYSTEM_SCHEMA
    }

    fn field_pairs(&self) -> &[FieldPair] {
        SYSTEM_PAIRS
    }

    fn reverse_map(&self) -> &[ReverseField] {
        SYSTEM_REVERSE
    }

    fn supports_delete(&self) -> bool {
        false
    }

    fn describe(&self, desired: &Record) -> String {
        format!(
            "system_issue {} ({})",
            desired.get_str("name").unwrap_or_default(),
            desired.get_str("device_type").unwrap_or_default()
        )
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let name = desired.get_str("name").unwrap_or_default();
        let device_type = desired.get_str("device_type").unwrap_or_default();
        let params = Record::new().with("deviceType", device_type);
        let candidates = ctx
            .list_all("issues", "get_system_issue_definitions", &params)
            .await?;
        find_unique(&self.describe(desired), &candidates, |r| {
            let same_name = ["displayName", "name"]
                .iter()
                .any(|field| r.get_str(field).is_some_and(|n| n.eq_ignore_ascii_case(name)));
            let same_type = r
                .get_str("deviceType")
                .is_some_and(|t| t.eq_ignore_ascii_case(device_type));
            same_name && same_type
        })
    }

    async fn create(&self, _ctx: &Context, desired: &Record) -> Result<Change> {
        Err(EngineError::MissingReference {
            what: "system issue",
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
            .with("id", require_id(current, "id", "update_system_issue_definition")?)
            .with(
                "payload",
                project(&carry_over(current, desired, SYSTEM_PAIRS), SYSTEM_PAIRS).into_value(),
            );
        let mutation = ctx
            .mutate("issues", "update_system_issue_definition", &params)
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
        ctx.list_all("issues", "get_system_issue_definitions", &Record::new())
            .await
    }
}
