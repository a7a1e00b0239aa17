//! Switching network profiles with their site assignments and Day-N
//! template attachments.
//!
//! A profile is a composite resource: the profile object itself, the sites
//! it is assigned to and the templates attached to it. Changes run in a
//! fixed order and a failure part-way through reports the steps that
//! completed. Nothing is rolled back; re-running converges.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};
use serde_json::{json, Value};

use crate::acquire::resolve_identity;
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::require_id;
use crate::reverse::{ReverseField, Shape, Transform};
use crate::schema::{FieldSpec, FieldType, Schema};

const PROFILE_TYPE: &str = "Switching";

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("profile_name").required().max_len(255),
        FieldSpec::list("site_names", FieldType::Str),
        FieldSpec::list("day_n_templates", FieldType::Str),
        FieldSpec::str("id"),
    ])
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("name", "profile_name"),
    FieldPair::new("siteIds", "site_ids"),
    FieldPair::new("templateIds", "template_ids"),
];

const REVERSE_MAP: &[ReverseField] = &[
    ReverseField::new("profile_name", "name", Shape::Str),
    ReverseField::new("site_names", "siteIds", Shape::List).with(Transform::SiteIdsToNames),
    ReverseField::new("day_n_templates", "templateNames", Shape::List),
];

fn strings(record: &Record, field: &str) -> Vec<String> {
    record
        .get_list(field)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Items of `want` missing from `have`, in `want` order.
fn missing<'a>(want: &'a [String], have: &[String]) -> Vec<&'a String> {
    want.iter().filter(|item| !have.contains(item)).collect()
}

/// Runs the steps of a composite change and tracks what completed.
struct Steps<'a> {
    ctx: &'a Context,
    completed: Vec<String>,
    last_response: Option<Value>,
}

impl<'a> Steps<'a> {
    const fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            completed: Vec::new(),
            last_response: None,
        }
    }

    async fn run(&mut self, step: String, family: &str, operation: &str, params: Record) -> Result<()> {
        match self.ctx.mutate(family, operation, &params).await {
            Ok(mutation) => {
                tracing::debug!(step = %step, "Profile step completed");
                self.last_response = Some(mutation.response);
                self.completed.push(step);
                Ok(())
            }
            Err(e) => Err(EngineError::at_step(step, &self.completed, e)),
        }
    }

    fn finish(self, operation: Operation) -> Change {
        let change = Change::new(operation);
        let change = match self.last_response {
            Some(response) => change.with_response(response),
            None => change,
        };
        change.with_steps(self.completed)
    }
}

/// Switching profiles, keyed by profile name.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchProfileReconciler;

impl SwitchProfileReconciler {
    async fn find_profile(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let name = desired.get_str("profile_name").unwrap_or_default();
        let params = Record::new().with("type", PROFILE_TYPE);
        let candidates = ctx
            .list_all("site_design", "get_network_profiles", &params)
            .await?;
        resolve_identity(
            &self.describe(desired),
            "id",
            desired.get_str("id"),
            &candidates,
            |r| {
                r.get_str("name") == Some(name)
                    && r.get_str("type")
                        .map_or(true, |t| t.eq_ignore_ascii_case(PROFILE_TYPE))
            },
        )
    }

    /// Attach the assigned site ids and attached templates to a profile record.
    async fn enrich(ctx: &Context, mut profile: Record) -> Result<Record> {
        let profile_id = require_id(&profile, "id", "get_profile_sites")?.to_string();
        let params = Record::new().with("profile_id", profile_id.as_str());

        let sites = ctx
            .list_all("site_design", "get_profile_sites", &params)
            .await?;
        let site_ids: Vec<Value> = sites
            .iter()
            .filter_map(|s| s.get_str("id").map(Value::from))
            .collect();

        let templates = ctx
            .list("configuration_templates", "get_profile_templates", &params)
            .await?;
        let template_ids: Vec<Value> = templates
            .iter()
            .filter_map(|t| t.get_str("id").map(Value::from))
            .collect();
        let template_names: Vec<Value> = templates
            .iter()
            .filter_map(|t| t.get_str("name").map(Value::from))
            .collect();

        profile.insert("siteIds", site_ids);
        profile.insert("templateIds", template_ids);
        profile.insert("templateNames", template_names);
        Ok(profile)
    }

    async fn template_ids(ctx: &Context, names: &[Value]) -> Result<Vec<String>> {
        let templates = ctx
            .list("configuration_templates", "get_templates", &Record::new())
            .await?;
        let by_name: HashMap<&str, &str> = templates
            .iter()
            .filter_map(|t| Some((t.get_str("name")?, t.get_str("id")?)))
            .collect();

        names
            .iter()
            .filter_map(Value::as_str)
            .map(|name| {
                by_name
                    .get(name)
                    .map(|id| (*id).to_string())
                    .ok_or_else(|| EngineError::MissingReference {
                        what: "template",
                        name: name.to_string(),
                    })
            })
            .collect()
    }

    async fn site_label(ctx: &Context, site_id: &str) -> String {
        match ctx.sites().await {
            Ok(directory) => directory.name_of(site_id).unwrap_or(site_id).to_string(),
            Err(_) => site_id.to_string(),
        }
    }

    fn template_label(desired: &Record, template_id: &str) -> String {
        let ids = strings(desired, "template_ids");
        let names = strings(desired, "day_n_templates");
        ids.iter()
            .position(|id| id == template_id)
            .and_then(|i| names.get(i).cloned())
            .unwrap_or_else(|| template_id.to_string())
    }

    async fn assign_sites(steps: &mut Steps<'_>, profile_id: &str, site_ids: &[&String]) -> Result<()> {
        for site_id in site_ids {
            let label = Self::site_label(steps.ctx, site_id).await;
            let params = Record::new()
                .with("profile_id", profile_id)
                .with("payload", json!({ "id": site_id }));
            steps
                .run(format!("assign site {label}"), "site_design", "assign_profile_to_site", params)
                .await?;
        }
        Ok(())
    }

    async fn unassign_sites(steps: &mut Steps<'_>, profile_id: &str, site_ids: &[&String]) -> Result<()> {
        for site_id in site_ids {
            let label = Self::site_label(steps.ctx, site_id).await;
            let params = Record::new()
                .with("profile_id", profile_id)
                .with("site_id", site_id.as_str());
            steps
                .run(
                    format!("unassign site {label}"),
                    "site_design",
                    "unassign_profile_from_site",
                    params,
                )
                .await?;
        }
        Ok(())
    }

    async fn attach_templates(
        steps: &mut Steps<'_>,
        desired: &Record,
        profile_id: &str,
        template_ids: &[&String],
    ) -> Result<()> {
        for template_id in template_ids {
            let params = Record::new()
                .with("profile_id", profile_id)
                .with("payload", json!({ "id": template_id }));
            steps
                .run(
                    format!("attach template {}", Self::template_label(desired, template_id)),
                    "configuration_templates",
                    "attach_profile_to_template",
                    params,
                )
                .await?;
        }
        Ok(())
    }

    async fn detach_templates(steps: &mut Steps<'_>, profile_id: &str, template_ids: &[&String]) -> Result<()> {
        for template_id in template_ids {
            let params = Record::new()
                .with("profile_id", profile_id)
                .with("template_id", template_id.as_str());
            steps
                .run(
                    format!("detach template {template_id}"),
                    "configuration_templates",
                    "detach_profile_from_template",
                    params,
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Reconciler for SwitchProfileReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SwitchProfile
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

    fn describe(&self, desired: &Record) -> String {
        format!(
            "switch_profile {}",
            desired.get_str("profile_name").unwrap_or_default()
        )
    }

    async fn resolve(&self, ctx: &Context, desired: &Record) -> Result<Record> {
        let mut resolved = desired.clone();
        if let Some(names) = desired.get_list("site_names") {
            resolved.insert("site_ids", ctx.site_ids(names).await?);
        }
        if let Some(names) = desired.get_list("day_n_templates") {
            resolved.insert("template_ids", Self::template_ids(ctx, names).await?);
        }
        Ok(resolved)
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        match self.find_profile(ctx, desired).await? {
            Some(profile) => Ok(Some(Self::enrich(ctx, profile).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let name = desired.get_str("profile_name").unwrap_or_default();
        let mut steps = Steps::new(ctx);

        let params = Record::new().with(
            "payload",
            json!({ "name": name, "namespace": "switching" }),
        );
        steps
            .run(format!("create profile {name}"), "site_design", "create_switch_profile", params)
            .await?;

        let profile = self.find_profile(ctx, desired).await?.ok_or_else(|| {
            EngineError::at_step(
                "look up created profile",
                &steps.completed,
                EngineError::UnexpectedResponse {
                    operation: "get_network_profiles".to_string(),
                    message: format!("profile {name} not listed after creation"),
                },
            )
        })?;
        let profile_id = require_id(&profile, "id", "create_switch_profile")?.to_string();

        let site_ids = strings(desired, "site_ids");
        Self::assign_sites(&mut steps, &profile_id, &site_ids.iter().collect::<Vec<_>>()).await?;

        let template_ids = strings(desired, "template_ids");
        Self::attach_templates(
            &mut steps,
            desired,
            &profile_id,
            &template_ids.iter().collect::<Vec<_>>(),
        )
        .await?;

        Ok(steps.finish(Operation::Created))
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        let profile_id = require_id(current, "id", "update_switch_profile")?;
        let mut steps = Steps::new(ctx);

        if desired.contains("site_ids") {
            let want = strings(desired, "site_ids");
            let have = strings(current, "siteIds");
            Self::assign_sites(&mut steps, profile_id, &missing(&want, &have)).await?;
            Self::unassign_sites(&mut steps, profile_id, &missing(&have, &want)).await?;
        }

        if desired.contains("template_ids") {
            let want = strings(desired, "template_ids");
            let have = strings(current, "templateIds");
            Self::attach_templates(&mut steps, desired, profile_id, &missing(&want, &have)).await?;
            Self::detach_templates(&mut steps, profile_id, &missing(&have, &want)).await?;
        }

        Ok(steps.finish(Operation::Updated))
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        let profile_id = require_id(current, "id", "delete_network_profile")?;
        let mut steps = Steps::new(ctx);

        let sites = strings(current, "siteIds");
        Self::unassign_sites(&mut steps, profile_id, &sites.iter().collect::<Vec<_>>()).await?;
        let templates = strings(current, "templateIds");
        Self::detach_templates(&mut steps, profile_id, &templates.iter().collect::<Vec<_>>()).await?;

        let name = current.get_str("name").unwrap_or(profile_id);
        let params = Record::new().with("id", profile_id);
        steps
            .run(format!("delete profile {name}"), "site_design", "delete_network_profile", params)
            .await?;

        Ok(steps.finish(Operation::Deleted))
    }

    /// Deletion needs only the profile name; templates and sites named in
    /// the record are not resolved.
    async fn delete(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        match self.acquire(ctx, desired).await? {
            None => Ok(Change::new(Operation::AlreadyAbsent)),
            Some(current) => self.remove(ctx, &current, desired).await,
        }
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        let params = Record::new().with("type", PROFILE_TYPE);
        let profiles = ctx
            .list_all("site_design", "get_network_profiles", &params)
            .await?;
        let mut enriched = Vec::with_capacity(profiles.len());
        for profile in profiles {
            enriched.push(Self::enrich(ctx, profile).await?);
        }
        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_preserves_order() {
        let want = vec!["S1".to_string(), "S2".to_string(), "S3".to_string()];
        let have = vec!["S2".to_string(), "S4".to_string()];
        assert_eq!(missing(&want, &have), [&"S1".to_string(), &"S3".to_string()]);
        assert_eq!(missing(&have, &want), [&"S4".to_string()]);
    }

    #[test]
    fn site_sets_compare_as_multisets() {
        let current = Record::try_from(serde_json::json!({
            "id": "P1", "name": "Access", "siteIds": ["S2", "S1"], "templateIds": []
        }))
        .unwrap();
        let same = Record::try_from(serde_json::json!({
            "profile_name": "Access", "site_ids": ["S1", "S2"]
        }))
        .unwrap();
        assert!(!SwitchProfileReconciler.compare(&current, &same).requires_update);

        let fewer = Record::try_from(serde_json::json!({
            "profile_name": "Access", "site_ids": ["S1"], "template_ids": ["T1"]
        }))
        .unwrap();
        let result = SwitchProfileReconciler.compare(&current, &fewer);
        assert_eq!(result.differing_fields, ["site_ids", "template_ids"]);
    }

    #[test]
    fn template_labels_use_declared_names() {
        let desired = Record::try_from(serde_json::json!({
            "day_n_templates": ["base-config"], "template_ids": ["T1"]
        }))
        .unwrap();
        assert_eq!(SwitchProfileReconciler::template_label(&desired, "T1"), "base-config");
        assert_eq!(SwitchProfileReconciler::template_label(&desired, "T9"), "T9");
    }
}
