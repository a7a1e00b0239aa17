//! AAA and ISE authentication and policy servers.

use std::sync::LazyLock;

use async_trait::async_trait;
use catalyst_core::{Record, ResourceKind};
use serde_json::{Map, Value};

use crate::acquire::resolve_identity;
use crate::context::Context;
use crate::diff::{DiffResult, FieldPair};
use crate::error::Result;
use crate::outcome::Operation;
use crate::reconciler::{Change, Reconciler};
use crate::resources::{carry_over, changed, named, project, require_id};
use crate::reverse::{Lookups, ReverseField, Shape, Transform};
use crate::schema::{FieldSpec, Schema};

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        FieldSpec::str("server_type")
            .choices(&["AAA", "ISE"])
            .default("AAA"),
        FieldSpec::str("server_ip_address").required(),
        FieldSpec::str("shared_secret").max_len(100),
        FieldSpec::str("protocol")
            .choices(&["RADIUS", "TACACS", "RADIUS_TACACS"])
            .default("RADIUS"),
        FieldSpec::str("encryption_scheme").choices(&["KEYWRAP", "RADSEC"]),
        FieldSpec::str("encryption_key"),
        FieldSpec::str("message_authenticator_code_key"),
        FieldSpec::int("authentication_port").range(1, 65535).default(1812),
        FieldSpec::int("accounting_port").range(1, 65535).default(1813),
        FieldSpec::int("retries").range(1, 3).default(3),
        FieldSpec::int("timeout").range(2, 20).default(4),
        FieldSpec::str("role").choices(&["primary", "secondary"]).default("secondary"),
        FieldSpec::bool("pxgrid_enabled"),
        FieldSpec::bool("use_dnac_cert_for_pxgrid"),
        FieldSpec::records(
            "cisco_ise_dtos",
            Schema::new(vec![
                FieldSpec::str("user_name").required(),
                FieldSpec::str("password"),
                FieldSpec::str("fqdn").required(),
                FieldSpec::str("ip_address").required(),
                FieldSpec::str("subscriber_name").required(),
                FieldSpec::str("description"),
                FieldSpec::str("ssh_key"),
            ]),
        ),
        FieldSpec::str("id"),
    ])
    .required_if("server_type", "ISE", &["cisco_ise_dtos"])
    .required_together(&["encryption_key", "message_authenticator_code_key"])
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("ipAddress", "server_ip_address"),
    FieldPair::new("isIseEnabled", "is_ise_enabled"),
    FieldPair::new("protocol", "protocol").case_insensitive(),
    FieldPair::new("encryptionScheme", "encryption_scheme").case_insensitive(),
    FieldPair::new("authenticationPort", "authentication_port").numeric(),
    FieldPair::new("accountingPort", "accounting_port").numeric(),
    FieldPair::new("retries", "retries").numeric(),
    FieldPair::new("timeoutSeconds", "timeout").numeric(),
    FieldPair::new("role", "role").case_insensitive(),
    FieldPair::new("pxgridEnabled", "pxgrid_enabled"),
    FieldPair::new("useDnacCertForPxgrid", "use_dnac_cert_for_pxgrid"),
];

/// Write-only fields, sent but never compared.
const SECRETS: &[(&str, &str)] = &[
    ("shared_secret", "sharedSecret"),
    ("encryption_key", "encryptionKey"),
    ("message_authenticator_code_key", "messageAuthenticatorCodeKey"),
];

const ISE_KEYS: &[(&str, &str)] = &[
    ("user_name", "userName"),
    ("password", "password"),
    ("fqdn", "fqdn"),
    ("ip_address", "ipAddress"),
    ("subscriber_name", "subscriberName"),
    ("description", "description"),
    ("ssh_key", "sshkey"),
];

const REVERSE_MAP: &[ReverseField] = &[
    ReverseField::new("server_type", "isIseEnabled", Shape::Str)
        .with(Transform::Custom(server_type)),
    ReverseField::new("server_ip_address", "ipAddress", Shape::Str),
    ReverseField::new("protocol", "protocol", Shape::Str),
    ReverseField::new("encryption_scheme", "encryptionScheme", Shape::Str),
    ReverseField::new("authentication_port", "authenticationPort", Shape::Int),
    ReverseField::new("accounting_port", "accountingPort", Shape::Int),
    ReverseField::new("retries", "retries", Shape::Int),
    ReverseField::new("timeout", "timeoutSeconds", Shape::Int),
    ReverseField::new("role", "role", Shape::Str),
    ReverseField::new("pxgrid_enabled", "pxgridEnabled", Shape::Bool),
    ReverseField::new("use_dnac_cert_for_pxgrid", "useDnacCertForPxgrid", Shape::Bool),
    ReverseField::new("cisco_ise_dtos", "ciscoIseDtos", Shape::List)
        .with(Transform::Custom(ise_nodes_from_controller)),
];

fn server_type(value: &Value, _: &Lookups) -> std::result::Result<Value, String> {
    match value {
        Value::Bool(true) => Ok("ISE".into()),
        Value::Bool(false) => Ok("AAA".into()),
        other => Err(format!("expected a boolean, found {other}")),
    }
}

fn rename_keys(item: &Value, pairs: &[(&str, &str)], to_controller: bool) -> Value {
    let Some(object) = item.as_object() else {
        return item.clone();
    };
    let mut renamed = Map::new();
    for (desired, controller) in pairs {
        let (from, to) = if to_controller {
            (*desired, *controller)
        } else {
            (*controller, *desired)
        };
        if let Some(value) = object.get(from).filter(|v| !v.is_null()) {
            renamed.insert(to.to_string(), value.clone());
        }
    }
    Value::Object(renamed)
}

fn ise_nodes_from_controller(value: &Value, _: &Lookups) -> std::result::Result<Value, String> {
    let nodes = value
        .as_array()
        .ok_or_else(|| format!("expected a list, found {value}"))?;
    Ok(Value::Array(
        nodes.iter().map(|n| rename_keys(n, ISE_KEYS, false)).collect(),
    ))
}

/// AAA and ISE servers, keyed by IP address.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthServerReconciler;

impl AuthServerReconciler {
    fn payload(desired: &Record) -> Record {
        let mut payload = project(desired, FIELD_PAIRS);
        for (field, key) in SECRETS {
            if let Some(value) = desired.get(field) {
                payload.insert(*key, value.clone());
            }
        }
        if let Some(nodes) = desired.get_list("cisco_ise_dtos") {
            let nodes: Vec<Value> = nodes.iter().map(|n| rename_keys(n, ISE_KEYS, true)).collect();
            payload.insert("ciscoIseDtos", nodes);
        }
        payload
    }
}

#[async_trait]
impl Reconciler for AuthServerReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::AuthServer
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
            "auth_server {}",
            desired.get_str("server_ip_address").unwrap_or_default()
        )
    }

    async fn resolve(&self, _ctx: &Context, desired: &Record) -> Result<Record> {
        Ok(match desired.get_str("server_type") {
            Some(server_type) => desired
                .clone()
                .with("is_ise_enabled", server_type.eq_ignore_ascii_case("ISE")),
            None => desired.clone(),
        })
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let address = desired.get_str("server_ip_address").unwrap_or_default();
        let candidates = ctx
            .list("system_settings", "get_auth_servers", &Record::new())
            .await?;
        resolve_identity(
            &self.describe(desired),
            "instanceUuid",
            desired.get_str("id"),
            &candidates,
            named("ipAddress", address),
        )
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let params = Record::new().with("payload", Self::payload(desired).into_value());
        let mutation = ctx
            .mutate("system_settings", "add_auth_server", &params)
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
            .with("id", require_id(current, "instanceUuid", "update_auth_server")?)
            .with(
                "payload",
                Self::payload(&carry_over(current, desired, FIELD_PAIRS)).into_value(),
            );
        let mutation = ctx
            .mutate("system_settings", "update_auth_server", &params)
            .await?;
        Ok(changed(Operation::Updated, mutation))
    }

    async fn remove(&self, ctx: &Context, current: &Record, _desired: &Record) -> Result<Change> {
        let params = Record::new().with(
            "id",
            require_id(current, "instanceUuid", "delete_auth_server")?,
        );
        let mutation = ctx
            .mutate("system_settings", "delete_auth_server", &params)
            .await?;
        Ok(changed(Operation::Deleted, mutation))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        ctx.list("system_settings", "get_auth_servers", &Record::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ise_requires_nodes() {
        let err = AuthServerReconciler
            .validate(&json!({"server_type": "ise", "server_ip_address": "10.0.0.5"}), "x")
            .unwrap_err();
        assert!(err.to_string().contains("cisco_ise_dtos"));
    }

    #[test]
    fn defaults_apply_on_create_only() {
        let desired = AuthServerReconciler
            .validate(&json!({"server_ip_address": "10.0.0.5", "shared_secret": "s3cret"}), "x")
            .unwrap();
        assert!(!desired.contains("authentication_port"));

        let current = Record::try_from(json!({
            "instanceUuid": "a1", "ipAddress": "10.0.0.5", "isIseEnabled": false,
            "protocol": "TACACS", "authenticationPort": 1645, "retries": 1, "role": "primary"
        }))
        .unwrap();
        assert!(!AuthServerReconciler.compare(&current, &desired).requires_update);

        let created = SCHEMA.with_defaults(&desired);
        assert_eq!(created.get_str("protocol"), Some("RADIUS"));
        assert_eq!(created.get_i64("authentication_port"), Some(1812));
        assert_eq!(created.get_str("role"), Some("secondary"));
    }

    #[test]
    fn payload_carries_secrets_and_nodes() {
        let desired = Record::try_from(json!({
            "server_ip_address": "10.0.0.5",
            "shared_secret": "s3cret",
            "is_ise_enabled": true,
            "cisco_ise_dtos": [{"user_name": "admin", "fqdn": "ise.example.com",
                                "ip_address": "10.0.0.5", "subscriber_name": "pxgrid"}]
        }))
        .unwrap();
        let payload = AuthServerReconciler::payload(&desired);
        assert_eq!(payload.get_str("sharedSecret"), Some("s3cret"));
        assert_eq!(payload.get_bool("isIseEnabled"), Some(true));
        assert_eq!(
            payload.get_list("ciscoIseDtos").unwrap()[0]["subscriberName"],
            "pxgrid"
        );
    }

    #[test]
    fn reverse_restores_server_type() {
        let current = Record::try_from(json!({
            "instanceUuid": "a1", "ipAddress": "10.0.0.9", "isIseEnabled": false,
            "protocol": "RADIUS", "authenticationPort": "1812", "timeoutSeconds": 4
        }))
        .unwrap();
        let desired = AuthServerReconciler
            .reverse(&current, &Lookups::default())
            .unwrap();
        assert_eq!(desired.get_str("server_type"), Some("AAA"));
        assert_eq!(desired.get_i64("authentication_port"), Some(1812));
        assert_eq!(desired.get_i64("timeout"), Some(4));
    }
}
