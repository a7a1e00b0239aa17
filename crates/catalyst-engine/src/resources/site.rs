//! Site hierarchy: areas, buildings and floors.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};
use serde_json::Value;

use crate::acquire::resolve_identity;
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{changed, project, require_id};
use crate::reverse::{Lookups, ReverseField, Shape, Transform};
use crate::schema::{FieldSpec, Schema};

const RF_MODELS: &[&str] = &[
    "Cubes And Walled Offices",
    "Drywall Office Only",
    "Indoor High Ceiling",
    "Outdoor Open Space",
    "Free Space",
];

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("type")
            .required()
            .choices(&["area", "building", "floor"]),
        FieldSpec::str("name").required().max_len(40),
        FieldSpec::str("parent_name_hierarchy").required(),
        FieldSpec::str("address"),
        FieldSpec::float("latitude"),
        FieldSpec::float("longitude"),
        FieldSpec::str("country"),
        FieldSpec::str("rf_model").choices(RF_MODELS),
        FieldSpec::float("width"),
        FieldSpec::float("length"),
        FieldSpec::float("height"),
        FieldSpec::int("floor_number").range(-200, 200),
        FieldSpec::str("units_of_measure").choices(&["feet", "meters"]),
        FieldSpec::str("id"),
    ])
    .required_together(&["latitude", "longitude"])
    .required_if("type", "floor", &["rf_model", "width", "length", "height"])
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("address", "address"),
    FieldPair::new("latitude", "latitude").numeric(),
    FieldPair::new("longitude", "longitude").numeric(),
    FieldPair::new("country", "country"),
    FieldPair::new("rfModel", "rf_model").case_insensitive(),
    FieldPair::new("width", "width").numeric(),
    FieldPair::new("length", "length").numeric(),
    FieldPair::new("height", "height").numeric(),
    FieldPair::new("floorNumber", "floor_number").numeric(),
    FieldPair::new("unitsOfMeasure", "units_of_measure").case_insensitive(),
];

const REVERSE_MAP: &[ReverseField] = &[
    ReverseField::new("type", "type", Shape::Str),
    ReverseField::new("name", "name", Shape::Str),
    ReverseField::new("parent_name_hierarchy", "nameHierarchy", Shape::Str)
        .with(Transform::Custom(parent_of)),
    ReverseField::new("address", "address", Shape::Str),
    ReverseField::new("latitude", "latitude", Shape::Float),
    ReverseField::new("longitude", "longitude", Shape::Float),
    ReverseField::new("country", "country", Shape::Str),
    ReverseField::new("rf_model", "rfModel", Shape::Str),
    ReverseField::new("width", "width", Shape::Float),
    ReverseField::new("length", "length", Shape::Float),
    ReverseField::new("height", "height", Shape::Float),
    ReverseField::new("floor_number", "floorNumber", Shape::Int),
    ReverseField::new("units_of_measure", "unitsOfMeasure", Shape::Str),
];

fn parent_of(value: &Value, _: &Lookups) -> std::result::Result<Value, String> {
    let hierarchy = value
        .as_str()
        .ok_or_else(|| format!("expected a name hierarchy, found {value}"))?;
    hierarchy
        .rsplit_once('/')
        .map(|(parent, _)| Value::String(parent.to_string()))
        .ok_or_else(|| format!("{hierarchy} has no parent"))
}

fn hierarchy(desired: &Record) -> String {
    format!(
        "{}/{}",
        desired
            .get_str("parent_name_hierarchy")
            .unwrap_or("Global")
            .trim_end_matches('/'),
        desired.get_str("name").unwrap_or_default()
    )
}

fn site_type(record: &Record) -> &str {
    record.get_str("type").unwrap_or("area")
}

/// Areas, buildings and floors.
///
/// Sites are keyed by their full name hierarchy. Parents are resolved through
/// the site directory, so a parent created earlier in the same run is found.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteReconciler;

impl SiteReconciler {
    fn payload(desired: &Record) -> Record {
        let mut payload = project(desired, FIELD_PAIRS);
        payload.insert("name", desired.get_str("name").unwrap_or_default());
        if let Some(parent_id) = desired.get_str("parent_id") {
            payload.insert("parentId", parent_id);
        }
        payload
    }
}

#[async_trait]
impl Reconciler for SiteReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Site
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
        format!("{} {}", site_type(desired), hierarchy(desired))
    }

    fn depth(&self, desired: &Record) -> usize {
        hierarchy(desired).matches('/').count()
    }

    async fn resolve(&self, ctx: &Context, desired: &Record) -> Result<Record> {
        let parent = desired.get_str("parent_name_hierarchy").unwrap_or("Global");
        let mut resolved = desired.clone();
        resolved.insert("name_hierarchy", hierarchy(desired));
        resolved.insert("parent_id", ctx.site_id(parent).await?);
        Ok(resolved)
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let name_hierarchy = desired.get_str("name_hierarchy").unwrap_or_default();
        let params = Record::new().with("nameHierarchy", name_hierarchy);
        let candidates = ctx.list_all("site_design", "get_sites", &params).await?;
        resolve_identity(
            &self.describe(desired),
            "id",
            desired.get_str("id"),
            &candidates,
            |r| r.get_str("nameHierarchy") == Some(name_hierarchy),
        )
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let operation = format!("create_{}", site_type(desired));
        let params = Record::new().with("payload", Self::payload(desired).into_value());
        let mutation = ctx.mutate("site_design", &operation, &params).await;
        ctx.invalidate_sites();
        Ok(changed(Operation::Created, mutation?))
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        let current_type = site_type(current);
        if !current_type.eq_ignore_ascii_case(site_type(desired)) {
            return Err(EngineError::UnsupportedOperation(format!(
                "{} exists as a {current_type}; site type cannot change",
                self.describe(desired)
            )));
        }
        let operation = format!("update_{}", site_type(desired));
        let params = Record::new()
            .with("id", require_id(current, "id", &operation)?)
            .with("payload", Self::payload(desired).into_value());
        let mutation = ctx.mutate("site_design", &operation, &params).await?;
        Ok(changed(Operation::Updated, mutation))
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        let operation = format!("delete_{}", site_type(current));
        let params = Record::new().with("id", require_id(current, "id", &operation)?);
        let mutation = ctx.mutate("site_design", &operation, &params).await;
        ctx.invalidate_sites();
        Ok(changed(Operation::Deleted, mutation?))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        let mut sites: Vec<Record> = ctx
            .list_all("site_design", "get_sites", &Record::new())
            .await?
            .into_iter()
            .filter(|r| !site_type(r).eq_ignore_ascii_case("global"))
            .collect();
        // parents first so the document replays in order
        sites.sort_by_key(|r| r.get_str("nameHierarchy").map_or(0, |h| h.matches('/').count()));
        Ok(sites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn floors_need_dimensions() {
        let err = SiteReconciler
            .validate(
                &json!({"type": "floor", "name": "F1", "parent_name_hierarchy": "Global/USA/SJC"}),
                "config[0].site[0]",
            )
            .unwrap_err();
        let EngineError::SchemaViolation(violations) = err else {
            panic!("expected schema violation");
        };
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "config[0].site[0]");
        assert!(violations[0].reason.contains("rf_model, width, length, height"));
    }

    #[test]
    fn depth_follows_hierarchy() {
        let area = Record::try_from(json!({"name": "USA", "parent_name_hierarchy": "Global"})).unwrap();
        let building =
            Record::try_from(json!({"name": "SJC", "parent_name_hierarchy": "Global/USA"})).unwrap();
        assert!(SiteReconciler.depth(&area) < SiteReconciler.depth(&building));
        assert_eq!(SiteReconciler.describe(&building), "area Global/USA/SJC");
    }

    #[test]
    fn reverse_derives_parent() {
        let current = Record::try_from(json!({
            "id": "S2", "name": "SJC", "nameHierarchy": "Global/USA/SJC", "type": "building",
            "address": "1 Main St", "latitude": 37.4, "longitude": -121.9
        }))
        .unwrap();
        let desired = SiteReconciler.reverse(&current, &Lookups::default()).unwrap();
        assert_eq!(desired.get_str("parent_name_hierarchy"), Some("Global/USA"));
        assert_eq!(
            desired.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            ["type", "name", "parent_name_hierarchy", "address", "latitude", "longitude"]
        );
    }
}
