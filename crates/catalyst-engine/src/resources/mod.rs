//! Resource orchestrators.
//!
//! One module per controller resource. Each provides a [`Reconciler`]
//! implementation with its static schema, field-pair table and reverse map.
//!
//! [`Reconciler`]: crate::reconciler::Reconciler

pub mod auth_server;
pub mod fabric;
pub mod fabric_transit;
pub mod health_score;
pub mod icap;
pub mod issues;
pub mod site;
pub mod ssid;
pub mod switch_profile;

use catalyst_core::Record;
use serde_json::Value;

use crate::context::Mutation;
use crate::diff::FieldPair;
use crate::error::{EngineError, Result};
use crate::outcome::Operation;
use crate::reconciler::Change;

/// Controller fields that are never sent back in an update payload.
const SERVER_FIELDS: &[&str] = &[
    "id",
    "instanceUuid",
    "inheritedSiteId",
    "inheritedSiteName",
    "inheritedSiteNameHierarchy",
    "lastModified",
    "lastUpdated",
];

/// Build a controller payload from the desired side of `pairs`.
pub(crate) fn project(desired: &Record, pairs: &[FieldPair]) -> Record {
    let mut payload = Record::new();
    for pair in pairs {
        if let Some(value) = desired.get(pair.desired) {
            payload.set_path(pair.controller, value.clone());
        }
    }
    payload
}

/// The desired record completed with current values for every pair it
/// leaves unset.
///
/// Update endpoints replace the fields they are sent, so an update built
/// from this keeps what the user did not declare.
pub(crate) fn carry_over(current: &Record, desired: &Record, pairs: &[FieldPair]) -> Record {
    let mut completed = desired.clone();
    for pair in pairs {
        if desired.get(pair.desired).is_some_and(|v| !v.is_null()) {
            continue;
        }
        if let Some(value) = current.get(pair.controller).filter(|v| !v.is_null()) {
            completed.set_path(pair.desired, value.clone());
        }
    }
    completed
}

/// Overlay a projected payload on the current record, dropping server fields.
///
/// Used where the controller expects the complete object on update.
pub(crate) fn overlay(current: &Record, desired: &Record, pairs: &[FieldPair]) -> Record {
    let mut payload = Record::new();
    for (key, value) in current.iter() {
        if !SERVER_FIELDS.contains(&key.as_str()) {
            payload.insert(key.clone(), value.clone());
        }
    }
    for pair in pairs {
        if let Some(value) = desired.get(pair.desired) {
            payload.set_path(pair.controller, value.clone());
        }
    }
    payload
}

/// The id of a current record.
pub(crate) fn require_id<'a>(current: &'a Record, field: &str, operation: &str) -> Result<&'a str> {
    current
        .get_str(field)
        .ok_or_else(|| EngineError::UnexpectedResponse {
            operation: operation.to_string(),
            message: format!("record has no '{field}'"),
        })
}

/// Turn a finished mutation into a change.
pub(crate) fn changed(operation: Operation, mutation: Mutation) -> Change {
    let response = match mutation.task.and_then(|t| t.data) {
        Some(data) => data,
        None => mutation.response,
    };
    Change::new(operation).with_response(response)
}

/// Name-matching predicate, exact.
pub(crate) fn named<'a>(field: &'a str, name: &'a str) -> impl Fn(&Record) -> bool + 'a {
    move |record| record.get_str(field) == Some(name)
}

/// A single-element list payload, for bulk endpoints.
pub(crate) fn bulk(item: Record) -> Value {
    Value::Array(vec![item.into_value()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAIRS: &[FieldPair] = &[
        FieldPair::new("authType", "auth_type"),
        FieldPair::new("ipTransitSettings.autonomousSystemNumber", "asn"),
    ];

    fn rec(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn projection_uses_controller_paths() {
        let desired = rec(json!({"auth_type": "OPEN", "asn": "65001", "other": 1}));
        let payload = project(&desired, PAIRS);
        assert_eq!(
            payload.into_value(),
            json!({"authType": "OPEN", "ipTransitSettings": {"autonomousSystemNumber": "65001"}})
        );
    }

    #[test]
    fn overlay_keeps_current_and_drops_server_fields() {
        let current = rec(json!({"id": "x", "authType": "WPA2_PERSONAL", "ssid": "Corp", "inheritedSiteId": "G"}));
        let desired = rec(json!({"auth_type": "OPEN"}));
        let payload = overlay(&current, &desired, PAIRS);
        assert_eq!(payload.into_value(), json!({"authType": "OPEN", "ssid": "Corp"}));
    }

    #[test]
    fn carry_over_fills_only_unset_pairs() {
        let current = rec(json!({
            "authType": "WPA2_PERSONAL",
            "ipTransitSettings": {"autonomousSystemNumber": "65001"}
        }));
        let desired = rec(json!({"auth_type": "OPEN"}));
        let completed = carry_over(&current, &desired, PAIRS);
        assert_eq!(completed.into_value(), json!({"auth_type": "OPEN", "asn": "65001"}));
    }

    #[test]
    fn missing_id_is_unexpected() {
        let err = require_id(&Record::new(), "id", "delete_ssid").unwrap_err();
        assert!(matches!(err, EngineError::UnexpectedResponse { .. }));
    }
}
