//! SD-Access fabric sites and fabric zones.
//!
//! Both are bound to a site of the hierarchy and share the same bulk API
//! shape: list payloads on add and update, delete by id.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};

use crate::acquire::resolve_identity;
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::Result;
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{bulk, carry_over, changed, project, require_id};
use crate::reverse::{ReverseField, Shape, Transform};
use crate::schema::{FieldSpec, Schema};

const AUTH_PROFILES: &[&str] = &[
    "No Authentication",
    "Open Authentication",
    "Closed Authentication",
    "Low Impact",
];

static SITE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("site_name_hierarchy").required(),
        FieldSpec::str("authentication_profile_name")
            .choices(AUTH_PROFILES)
            .default("No Authentication"),
        FieldSpec::bool("is_pub_sub_enabled").default(false),
        FieldSpec::str("id"),
    ])
});

static ZONE_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("site_name_hierarchy").required(),
        FieldSpec::str("authentication_profile_name")
            .choices(AUTH_PROFILES)
            .default("No Authentication"),
        FieldSpec::str("id"),
    ])
});

const SITE_PAIRS: &[FieldPair] = &[
    FieldPair::new("siteId", "site_id"),
    FieldPair::new("authenticationProfileName", "authentication_profile_name").case_insensitive(),
    FieldPair::new("isPubSubEnabled", "is_pub_sub_enabled"),
];

const ZONE_PAIRS: &[FieldPair] = &[
    FieldPair::new("siteId", "site_id"),
    FieldPair::new("authenticationProfileName", "authentication_profile_name").case_insensitive(),
];

const SITE_REVERSE: &[ReverseField] = &[
    ReverseField::new("site_name_hierarchy", "siteId", Shape::Str).with(Transform::SiteIdToName),
    ReverseField::new(
        "authentication_profile_name",
        "authenticationProfileName",
        Shape::Str,
    ),
    ReverseField::new("is_pub_sub_enabled", "isPubSubEnabled", Shape::Bool),
];

const ZONE_REVERSE: &[ReverseField] = &[
    ReverseField::new("site_name_hierarchy", "siteId", Shape::Str).with(Transform::SiteIdToName),
    ReverseField::new(
        "authentication_profile_name",
        "authenticationProfileName",
        Shape::Str,
    ),
];

/// Operation names of one fabric collection.
struct Api {
    noun: &'static str,
    list: &'static str,
    add: &'static str,
    update: &'static str,
    delete: &'static str,
}

const SITE_API: Api = Api {
    noun: "fabric_site",
    list: "get_fabric_sites",
    add: "add_fabric_site",
    update: "update_fabric_site",
    delete: "delete_fabric_site",
};

const ZONE_API: Api = Api {
    noun: "fabric_zone",
    list: "get_fabric_zones",
    add: "add_fabric_zone",
    update: "update_fabric_zone",
    delete: "delete_fabric_zone",
};

fn describe(api: &Api, desired: &Record) -> String {
    format!(
        "{} {}",
        api.noun,
        desired.get_str("site_name_hierarchy").unwrap_or_default()
    )
}

async fn resolve(ctx: &Context, desired: &Record) -> Result<Record> {
    let site = desired.get_str("site_name_hierarchy").unwrap_or_default();
    let site_id = ctx.site_id(site).await?;
    Ok(desired.clone().with("site_id", site_id))
}

async fn acquire(api: &Api, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
    let site_id = desired.get_str("site_id").unwrap_or_default();
    let params = Record::new().with("siteId", site_id);
    let candidates = ctx.list_all("sda", api.list, &params).await?;
    resolve_identity(
        &describe(api, desired),
        "id",
        desired.get_str("id"),
        &candidates,
        |r| r.get_str("siteId") == Some(site_id),
    )
}

async fn create(api: &Api, pairs: &[FieldPair], ctx: &Context, desired: &Record) -> Result<Change> {
    let params = Record::new().with("payload", bulk(project(desired, pairs)));
    let mutation = ctx.mutate("sda", api.add, &params).await?;
    Ok(changed(Operation::Created, mutation))
}

async fn update(
    api: &Api,
    pairs: &[FieldPair],
    ctx: &Context,
    current: &Record,
    desired: &Record,
) -> Result<Change> {
    let mut item = project(&carry_over(current, desired, pairs), pairs);
    item.insert("id", require_id(current, "id", api.update)?);
    let params = Record::new().with("payload", bulk(item));
    let mutation = ctx.mutate("sda", api.update, &params).await?;
    Ok(changed(Operation::Updated, mutation))
}

async fn remove(api: &Api, ctx: &Context, current: &Record) -> Result<Change> {
    let params = Record::new().with("id", require_id(current, "id", api.delete)?);
    let mutation = ctx.mutate("sda", api.delete, &params).await?;
    Ok(changed(Operation::Deleted, mutation))
}

/// Fabric sites, one per site of the hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FabricSiteReconciler;

#[async_trait]
impl Reconciler for FabricSiteReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::FabricSite
    }

    fn schema(&self) -> &Schema {
        &SITE_SCHEMA
    }

    fn field_pairs(&self) -> &[FieldPair] {
        SITE_PAIRS
    }

    fn reverse_map(&self) -> &[ReverseField] {
        SITE_REVERSE
    }

    fn describe(&self, desired: &Record) -> String {
        describe(&SITE_API, desired)
    }

    async fn resolve(&self, ctx: &Context, desired: &Record) -> Result<Record> {
        resolve(ctx, desired).await
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        acquire(&SITE_API, ctx, desired).await
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        create(&SITE_API, SITE_PAIRS, ctx, desired).await
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        update(&SITE_API, SITE_PAIRS, ctx, current, desired).await
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        remove(&SITE_API, ctx, current).await
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list_all("sda", SITE_API.list, &Record::new()).await
    }
}

/// Fabric zones inside a fabric site.
#[derive(Debug, Clone, Copy, Default)]
pub struct FabricZoneReconciler;

#[async_trait]
impl Reconciler for FabricZoneReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::FabricZone
    }

    fn schema(&self) -> &Schema {
        &ZONE_SCHEMA
    }

    fn field_pairs(&self) -> &[FieldPair] {
        ZONE_PAIRS
    }

    fn reverse_map(&self) -> &[ReverseField] {
        ZONE_REVERSE
    }

    fn describe(&self, desired: &Record) -> String {
        describe(&ZONE_API, desired)
    }

    fn depth(&self, desired: &Record) -> usize {
        desired
            .get_str("site_name_hierarchy")
            .map_or(0, |h| h.matches('/').count())
    }

    async fn resolve(&self, ctx: &Context, desired: &Record) -> Result<Record> {
        resolve(ctx, desired).await
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        acquire(&ZONE_API, ctx, desired).await
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        create(&ZONE_API, ZONE_PAIRS, ctx, desired).await
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        update(&ZONE_API, ZONE_PAIRS, ctx, current, desired).await
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        remove(&ZONE_API, ctx, current).await
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list_all("sda", ZONE_API.list, &Record::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::Lookups;
    use serde_json::json;

    #[test]
    fn defaults_fill_the_create_payload() {
        let desired = FabricSiteReconciler
            .validate(&json!({"site_name_hierarchy": "Global/USA/SJC"}), "x")
            .unwrap()
            .with("site_id", "S2");
        assert_eq!(project(&desired, SITE_PAIRS).into_value(), json!({"siteId": "S2"}));

        let payload = project(&SITE_SCHEMA.with_defaults(&desired), SITE_PAIRS);
        assert_eq!(
            payload.into_value(),
            json!({"siteId": "S2", "authenticationProfileName": "No Authentication", "isPubSubEnabled": false})
        );
    }

    #[test]
    fn reverse_resolves_site_names() {
        let lookups = Lookups {
            site_names: [("S2".to_string(), "Global/USA/SJC".to_string())].into(),
        };
        let current = Record::try_from(json!({
            "id": "fs-1", "siteId": "S2", "authenticationProfileName": "Closed Authentication",
            "isPubSubEnabled": false
        }))
        .unwrap();
        let desired = FabricSiteReconciler.reverse(&current, &lookups).unwrap();
        assert_eq!(desired.get_str("site_name_hierarchy"), Some("Global/USA/SJC"));
        assert_eq!(desired.get_bool("is_pub_sub_enabled"), Some(false));

        let orphan = Record::try_from(json!({"siteId": "S9"})).unwrap();
        let err = FabricZoneReconciler.reverse(&orphan, &lookups).unwrap_err();
        assert!(err.starts_with("site_name_hierarchy:"));
    }

    #[test]
    fn auth_profile_compares_ignoring_case() {
        let current = Record::try_from(json!({"siteId": "S2", "authenticationProfileName": "low impact"})).unwrap();
        let desired = Record::try_from(json!({"site_id": "S2", "authentication_profile_name": "Low Impact"})).unwrap();
        assert!(!FabricZoneReconciler.compare(&current, &desired).requires_update);
    }
}
