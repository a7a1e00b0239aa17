//! Wireless SSIDs scoped to a site.

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
use crate::resources::{changed, overlay, project, require_id};
use crate::reverse::{ReverseField, Shape, Transform};
use crate::schema::{FieldSpec, FieldType, Schema};

const PERSONAL: &[&str] = &["WPA2_PERSONAL", "WPA3_PERSONAL", "WPA2_WPA3_PERSONAL"];

/// Older auth type names still accepted in documents.
const AUTH_ALIASES: &[(&str, &str)] = &[
    ("WPA2_PSK", "WPA2_PERSONAL"),
    ("WPA3_PSK", "WPA3_PERSONAL"),
];

static SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    let mut schema = Schema::new(vec![
        FieldSpec::str("ssid_name").required().max_len(32),
        FieldSpec::str("site_name_hierarchy").default("Global"),
        FieldSpec::str("ssid_type")
            .choices(&["Enterprise", "Guest"])
            .default("Enterprise"),
        FieldSpec::str("auth_type").required().choices(&[
            "OPEN",
            "OPEN_SECURED",
            "WPA2_ENTERPRISE",
            "WPA2_PERSONAL",
            "WPA3_ENTERPRISE",
            "WPA3_PERSONAL",
            "WPA2_WPA3_PERSONAL",
            "WPA2_WPA3_ENTERPRISE",
        ]),
        FieldSpec::str("passphrase").max_len(63),
        FieldSpec::str("profile_name"),
        FieldSpec::str("ssid_radio_type").choices(&[
            "Triple band operation(2.4GHz, 5GHz and 6GHz)",
            "5GHz only",
            "2.4GHz only",
            "6GHz only",
            "2.4 and 5 GHz",
            "2.4 and 6 GHz",
            "5 and 6 GHz",
        ]),
        FieldSpec::str("fast_transition").choices(&["ADAPTIVE", "ENABLE", "DISABLE"]),
        FieldSpec::bool("broadcast_ssid"),
        FieldSpec::bool("admin_status"),
        FieldSpec::bool("mac_filtering_enabled"),
        FieldSpec::list("auth_servers", FieldType::Str),
        FieldSpec::int("session_timeout").range(1, 86400),
        FieldSpec::int("client_exclusion_timeout").range(0, 2_147_483_647),
        FieldSpec::str("id"),
    ]);
    for auth_type in PERSONAL {
        schema = schema.required_if("auth_type", *auth_type, &["passphrase"]);
    }
    schema
});

const FIELD_PAIRS: &[FieldPair] = &[
    FieldPair::new("ssid", "ssid_name"),
    FieldPair::new("wlanType", "ssid_type").case_insensitive(),
    FieldPair::new("authType", "auth_type").case_insensitive(),
    FieldPair::new("profileName", "profile_name"),
    FieldPair::new("ssidRadioType", "ssid_radio_type").case_insensitive(),
    FieldPair::new("fastTransition", "fast_transition").case_insensitive(),
    FieldPair::new("isBroadcastSSID", "broadcast_ssid"),
    FieldPair::new("isEnabled", "admin_status"),
    FieldPair::new("isMacFilteringEnabled", "mac_filtering_enabled"),
    FieldPair::new("authServers", "auth_servers"),
    FieldPair::new("sessionTimeOut", "session_timeout").numeric(),
    FieldPair::new("clientExclusionTimeout", "client_exclusion_timeout").numeric(),
];

const REVERSE_MAP: &[ReverseField] = &[
    ReverseField::new("ssid_name", "ssid", Shape::Str),
    ReverseField::new("site_name_hierarchy", "siteId", Shape::Str).with(Transform::SiteIdToName),
    ReverseField::new("ssid_type", "wlanType", Shape::Str),
    ReverseField::new("auth_type", "authType", Shape::Str),
    ReverseField::new("profile_name", "profileName", Shape::Str),
    ReverseField::new("ssid_radio_type", "ssidRadioType", Shape::Str),
    ReverseField::new("fast_transition", "fastTransition", Shape::Str),
    ReverseField::new("broadcast_ssid", "isBroadcastSSID", Shape::Bool),
    ReverseField::new("admin_status", "isEnabled", Shape::Bool),
    ReverseField::new("mac_filtering_enabled", "isMacFilteringEnabled", Shape::Bool),
    ReverseField::new("auth_servers", "authServers", Shape::List),
    ReverseField::new("session_timeout", "sessionTimeOut", Shape::Int),
    ReverseField::new("client_exclusion_timeout", "clientExclusionTimeout", Shape::Int),
];

/// True if the record was defined at `site_id` rather than inherited.
fn defined_at(record: &Record, site_id: &str) -> bool {
    record
        .get_str("inheritedSiteId")
        .map_or(true, |inherited| inherited == site_id)
}

/// Rewrite an aliased `auth_type` to its controller name.
fn canonical_auth_type(raw: &Value) -> Option<Value> {
    let auth_type = raw.get("auth_type")?.as_str()?;
    let (_, name) = AUTH_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(auth_type))?;
    let mut raw = raw.clone();
    raw["auth_type"] = Value::from(*name);
    Some(raw)
}

/// SSIDs, keyed by name within a site.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsidReconciler;

impl SsidReconciler {
    fn payload(desired: &Record) -> Record {
        let mut payload = project(desired, FIELD_PAIRS);
        if let Some(passphrase) = desired.get_str("passphrase") {
            payload.insert("passphrase", passphrase);
        }
        if !payload.contains("profileName") {
            payload.insert("profileName", desired.get_str("ssid_name").unwrap_or_default());
        }
        payload
    }
}

#[async_trait]
impl Reconciler for SsidReconciler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Ssid
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

    fn validate(&self, raw: &Value, path: &str) -> Result<Record> {
        let aliased = canonical_auth_type(raw);
        SCHEMA
            .validate_at(aliased.as_ref().unwrap_or(raw), path)
            .map_err(EngineError::SchemaViolation)
    }

    fn describe(&self, desired: &Record) -> String {
        format!(
            "ssid {} @ {}",
            desired.get_str("ssid_name").unwrap_or_default(),
            desired.get_str("site_name_hierarchy").unwrap_or("Global")
        )
    }

    async fn resolve(&self, ctx: &Context, desired: &Record) -> Result<Record> {
        let site = desired.get_str("site_name_hierarchy").unwrap_or("Global");
        let site_id = ctx.site_id(site).await?;
        Ok(desired.clone().with("site_id", site_id))
    }

    async fn acquire(&self, ctx: &Context, desired: &Record) -> Result<Option<Record>> {
        let site_id = desired.get_str("site_id").unwrap_or_default();
        let name = desired.get_str("ssid_name").unwrap_or_default();
        let params = Record::new().with("site_id", site_id).with("ssid", name);
        let candidates = ctx.list_all("wireless", "get_ssids", &params).await?;
        resolve_identity(
            &self.describe(desired),
            "id",
            desired.get_str("id"),
            &candidates,
            |r| r.get_str("ssid") == Some(name) && defined_at(r, site_id),
        )
    }

    async fn create(&self, ctx: &Context, desired: &Record) -> Result<Change> {
        let params = Record::new()
            .with("site_id", desired.get_str("site_id").unwrap_or_default())
            .with("payload", Self::payload(desired).into_value());
        let mutation = ctx.mutate("wireless", "create_ssid", &params).await?;
        Ok(changed(Operation::Created, mutation))
    }

    async fn update(
        &self,
        ctx: &Context,
        current: &Record,
        desired: &Record,
        _diff: &DiffResult,
    ) -> Result<Change> {
        // the controller replaces the whole SSID, so send it complete
        let mut payload = overlay(current, desired, FIELD_PAIRS);
        payload.remove("siteId");
        if let Some(passphrase) = desired.get_str("passphrase") {
            payload.insert("passphrase", passphrase);
        }
        let params = Record::new()
            .with("site_id", desired.get_str("site_id").unwrap_or_default())
            .with("id", require_id(current, "id", "update_ssid")?)
            .with("payload", payload.into_value());
        let mutation = ctx.mutate("wireless", "update_ssid", &params).await?;
        Ok(changed(Operation::Updated, mutation))
    }

    async fn remove(&self, ctx: &Context, current: &Record, desired: &Record) -> Result<Change> {
        let params = Record::new()
            .with("site_id", desired.get_str("site_id").unwrap_or_default())
            .with("id", require_id(current, "id", "delete_ssid")?);
        let mutation = ctx.mutate("wireless", "delete_ssid", &params).await?;
        Ok(changed(Operation::Deleted, mutation))
    }

    async fn list_current(&self, ctx: &Context) -> Result<Vec<Record>> {
        let directory = ctx.sites().await?;
        let mut ssids = Vec::new();
        for site in directory.entries() {
            let params = Record::new().with("site_id", site.id.as_str());
            for record in ctx.list_all("wireless", "get_ssids", &params).await? {
                if defined_at(&record, &site.id) {
                    ssids.push(record.with("siteId", site.id.as_str()));
                }
            }
        }
        tracing::debug!(count = ssids.len(), "Collected site-level SSIDs");
        Ok(ssids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn personal_ssids_need_a_passphrase() {
        let err = SsidReconciler
            .validate(&json!({"ssid_name": "Corp", "auth_type": "wpa2_personal"}), "x")
            .unwrap_err();
        assert!(err.to_string().contains("passphrase"));

        let desired = SsidReconciler
            .validate(
                &json!({"ssid_name": "Corp", "auth_type": "wpa2_personal", "passphrase": "hunter22"}),
                "x",
            )
            .unwrap();
        assert_eq!(desired.get_str("auth_type"), Some("WPA2_PERSONAL"));
        assert!(!desired.contains("site_name_hierarchy"));
        assert_eq!(SsidReconciler.describe(&desired), "ssid Corp @ Global");
    }

    #[test]
    fn psk_auth_types_are_aliases() {
        let desired = SsidReconciler
            .validate(
                &json!({"ssid_name": "Corp", "auth_type": "wpa2_psk", "passphrase": "hunter22"}),
                "x",
            )
            .unwrap();
        assert_eq!(desired.get_str("auth_type"), Some("WPA2_PERSONAL"));

        let err = SsidReconciler
            .validate(&json!({"ssid_name": "Corp", "auth_type": "WPA3_PSK"}), "x")
            .unwrap_err();
        assert!(err.to_string().contains("passphrase"));

        let err = SsidReconciler
            .validate(&json!({"ssid_name": "Corp", "auth_type": "WPA9_PSK"}), "x")
            .unwrap_err();
        assert!(err.to_string().contains("auth_type"));
    }

    #[test]
    fn payload_defaults_profile_name() {
        let desired = Record::try_from(json!({
            "ssid_name": "Corp", "auth_type": "WPA2_PERSONAL", "passphrase": "hunter22",
            "ssid_type": "Enterprise", "site_id": "S1"
        }))
        .unwrap();
        let payload = SsidReconciler::payload(&desired);
        assert_eq!(payload.get_str("ssid"), Some("Corp"));
        assert_eq!(payload.get_str("authType"), Some("WPA2_PERSONAL"));
        assert_eq!(payload.get_str("profileName"), Some("Corp"));
        assert_eq!(payload.get_str("passphrase"), Some("hunter22"));
        assert!(!payload.contains("site_id"));
    }

    #[test]
    fn inherited_ssids_are_not_local() {
        let local = Record::try_from(json!({"ssid": "Corp"})).unwrap();
        let inherited = Record::try_from(json!({"ssid": "Corp", "inheritedSiteId": "G"})).unwrap();
        assert!(defined_at(&local, "S1"));
        assert!(!defined_at(&inherited, "S1"));
        assert!(defined_at(&inherited, "G"));
    }
}
