//! SD-Access transit networks.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};

use crate::acquire::resolve_identity;
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::Result;
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{bulk, carry_over, changed, named, project, require_id};
use crate::reverse::{ReverseField, Shape};
use crate::schema::{FieldSpec, FieldType, Schema};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("name").required(),
        FieldSpec::str("transit_type").required().choices(&[
            "IP_BASED_TRANSIT",
            "SDA_LISP_PUB_SUB_TRANSIT",
            "SDA_LISP_BGP_TRANSIT",
        ]),
        FieldSpec::dict(
            "ip_transit_settings",
            Schema::new(vec![
                FieldSpec::str("routing_protocol_name")
                    .choices(&["BGP"])
                    .default("BGP"),
                FieldSpec::str("autonomous_system_number").required().max_len(11),
            ]),
        ),
        FieldSpec::dict(
            "sda_transit_settings",
            Schema::new(vec![
                FieldSpec::bool("is_multicast_over_transit_enabled"),
                FieldSpec::list("control_plane_network_device_ids", FieldType::Str),
            ]),
        ),
        FieldSpec::str("id"),
    ])
    .mutually_exclusive(&["ip_transit_settings", "sda_transit_settings"])
    .required_if("transit_type", "IP_BASED_TRANSIT", &["ip_transit_settings"])
    .required_if("transit_type", "SDA_LISP_PUB_SUB_TRANSIT", &["sda_transit_settings"])
    .required_if("transit_type", "SDA_LISP_BGP_TRANSIT", &["sda_transit_settings"])
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("name", "name"),
    FieldPair::new("type", "transit_type").case_insensitive(),
    FieldPair::new(
        "ipTransitSettings.routingProtocolName",
        "ip_transit_settings.routing_protocol_name",
    )
    .case_insensitive(),
    FieldPair::new(
        "ipTransitSettings.autonomousSystemNumber",
        "ip_transit_settings.autonomous_system_number",
    ),
    FieldPair::new(
        "sdaTransitSettings.isMulticastOverTransitEnabled",
        "sda_transit_settings.is_multicast_over_transit_enabled",
    ),
    FieldPair::new(
        "sdaTransitSettings.controlPlaneNetworkDeviceIds",
        "sda_transit_settings.control_plane_network_device_ids",
    ),
];

const REVERSE_MAP: &[ReverseField] = &[
    ReverseField::new("name", "name", Shape::Str),
    ReverseField::new("transit_type", "type", Shape::Str),
    ReverseField::new(
        "ip_transit_settings.routing_protocol_name",
        "ipTransitSettings.routingProtocolName",
        Shape::Str,
    ),
    ReverseField::new(
        "ip_transit_settings.autonomous_system_number",
        "ipTransitSettings.autonomousSystemNumber",
        Shape::Str,
    ),
    ReverseField::new(
        "sda_transit_settings.is_multicast_over_transit_enabled",
        "sdaTransitSettings.isMulticastOverTransitEnabled",
        Shape::Bool,
    ),
    ReverseField::new(
        "sda_transit_settings.control_plane_network_device_ids",
        "sdaTransitSettings.controlPlaneNetworkDeviceIds",
        Shape::List,
    ),
];

/// Transit networks, keyed by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FabricTransitReconciler;

#[async_trait]
impl Reconciler for FabricTransitReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::FabricTransit
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
        format!("fabric_transit {}", desired.get_str("name").unwrap_or_default())
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let name = desired.get_str("name").unwrap_or_default();
        let params = Record::new().with("name", name);
        let candidates = ctx.list_all("sda", "get_transit_networks", &params).await?;
        resolve_identity(
            &self.describe(desired),
            "id",
            desired.get_str("id"),
            &candidates,
            named("name", name),
        )
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let params = Record::new().with("payload", bulk(project(desired, FIELD_PAIRS)));
        let mutation = ctx.mutate("sda", "add_transit_network", &params).await?;
        Ok(changed(Operation::Created, mutation))
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        let mut item = project(&carry_over(current, desired, FIELD_PAIRS), FIELD_PAIRS);
        item.insert("id", require_id(current, "id", "update_transit_network")?);
        let params = Record::new().with("payload", bulk(item));
        let mutation = ctx.mutate("sda", "update_transit_network", &params).await?;
        Ok(changed(Operation::Updated, mutation))
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        let params = Record::new().with("id", require_id(current, "id", "delete_transit_network")?);
        let mutation = ctx.mutate("sda", "delete_transit_network", &params).await?;
        Ok(changed(Operation::Deleted, mutation))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list_all("sda", "get_transit_networks", &Record::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverse::Lookups;
    use serde_json::json;

    #[test]
    fn settings_must_match_type() {
        let err = FabricTransitReconciler
            .validate(
                &json!({"name": "T1", "transit_type": "SDA_LISP_PUB_SUB_TRANSIT"}),
                "config[0].fabric_transit[0]",
            )
            .unwrap_err();
        assert!(err.to_string().contains("sda_transit_settings"));

        let ok = FabricTransitReconciler
            .validate(
                &json!({"name": "T1", "transit_type": "ip_based_transit",
                        "ip_transit_settings": {"autonomous_system_number": 65001}}),
                "config[0].fabric_transit[0]",
            )
            .unwrap();
        assert_eq!(ok.get_str("transit_type"), Some("IP_BASED_TRANSIT"));
        assert!(!ok.contains("ip_transit_settings.routing_protocol_name"));
        assert_eq!(
            SCHEMA.with_defaults(&ok).get_str("ip_transit_settings.routing_protocol_name"),
            Some("BGP")
        );
        assert_eq!(ok.get_str("ip_transit_settings.autonomous_system_number"), Some("65001"));
    }

    #[test]
    fn nested_settings_diff_and_reverse() {
        let current = Record::try_from(json!({
            "id": "t-1", "name": "T1", "type": "IP_BASED_TRANSIT",
            "ipTransitSettings": {"routingProtocolName": "BGP", "autonomousSystemNumber": "65001"}
        }))
        .unwrap();
        let desired = FabricTransitReconciler
            .reverse(&current, &Lookups::default())
            .unwrap();
        assert!(!FabricTransitReconciler.compare(&current, &desired).requires_update);

        let mut changed = desired.clone();
        changed.set_path("ip_transit_settings.autonomous_system_number", json!("65002"));
        let result = FabricTransitReconciler.compare(&current, &changed);
        assert_eq!(
            result.differing_fields,
            ["ip_transit_settings.autonomous_system_number"]
        );
    }
}
