//! Reverse field maps: rebuilding desired records from controller records.

use std::collections::HashMap;

use catalyst_core::Record;
use serde_json::Value;

/// Output shape of a reverse-mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// String.
    Str,
    /// Integer.
    Int,
    /// Float.
    Float,
    /// Boolean.
    Bool,
    /// List, elements passed through.
    List,
    /// Any value, passed through.
    Raw,
}

/// Name lookups available to transforms.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    /// Site id to name hierarchy.
    pub site_names: HashMap<String, String>,
}

impl Lookups {
    /// Resolve a site id to its name hierarchy.
    #[must_use]
    pub fn site_name(&self, id: &str) -> Option<&str> {
        self.site_names.get(id).map(String::as_str)
    }
}

/// A transform applied to a controller value before it is stored.
#[derive(Clone, Copy)]
pub enum Transform {
    /// Site id to site name hierarchy.
    SiteIdToName,
    /// List of site ids to list of name hierarchies.
    SiteIdsToNames,
    /// Resource-specific conversion.
    Custom(fn(&Value, &Lookups) -> Result<Value, String>),
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SiteIdToName => f.write_str("SiteIdToName"),
            Self::SiteIdsToNames => f.write_str("SiteIdsToNames"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Transform {
    fn apply(self, value: &Value, lookups: &Lookups) -> Result<Value, String> {
        match self {
            Self::SiteIdToName => site_name(value, lookups).map(Value::String),
            Self::SiteIdsToNames => match value {
                Value::Array(ids) => ids
                    .iter()
                    .map(|id| site_name(id, lookups).map(Value::String))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => site_name(other, lookups).map(|name| Value::Array(vec![name.into()])),
            },
            Self::Custom(convert) => convert(value, lookups),
        }
    }
}

fn site_name(value: &Value, lookups: &Lookups) -> Result<String, String> {
    let id = value
        .as_str()
        .ok_or_else(|| format!("site id must be a string, found {value}"))?;
    lookups
        .site_name(id)
        .map(str::to_string)
        .ok_or_else(|| format!("site id {id} is not in the site hierarchy"))
}

/// One entry of a reverse map.
#[derive(Debug, Clone, Copy)]
pub struct ReverseField {
    /// Dotted path in the rebuilt desired record.
    pub desired: &'static str,
    /// Dotted path in the controller record.
    pub controller: &'static str,
    /// Output shape.
    pub shape: Shape,
    /// Optional conversion.
    pub transform: Option<Transform>,
}

impl ReverseField {
    /// A plain field.
    #[must_use]
    pub const fn new(desired: &'static str, controller: &'static str, shape: Shape) -> Self {
        Self {
            desired,
            controller,
            shape,
            transform: None,
        }
    }

    /// Attach a transform.
    #[must_use]
    pub const fn with(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Rebuild a desired record from a controller record.
///
/// Fields are emitted in map order. Null, empty-string, empty-list and
/// empty-object values are omitted.
///
/// # Errors
///
/// Returns the first transform failure, naming the desired field.
pub fn apply(current: &Record, fields: &[ReverseField], lookups: &Lookups) -> Result<Record, String> {
    let mut record = Record::new();
    for field in fields {
        let Some(raw) = current.get(field.controller) else {
            continue;
        };
        let value = match field.transform {
            Some(transform) => transform
                .apply(raw, lookups)
                .map_err(|e| format!("{}: {e}", field.desired))?,
            None => raw.clone(),
        };
        let value = reshape(value, field.shape);
        if !is_empty(&value) {
            record.set_path(field.desired, value);
        }
    }
    Ok(record)
}

fn reshape(value: Value, shape: Shape) -> Value {
    match (shape, value) {
        (Shape::Str, Value::Number(n)) => Value::String(n.to_string()),
        (Shape::Str, Value::Bool(b)) => Value::String(b.to_string()),
        (Shape::Int, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_or(Value::String(s), Value::from),
        (Shape::Int, Value::Number(n)) => n.as_i64().map_or(Value::Number(n), Value::from),
        (Shape::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::String(s), Value::Number),
        (Shape::Bool, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(s),
        },
        (Shape::List, Value::Array(items)) => Value::Array(items),
        (Shape::List, scalar) if !scalar.is_null() => Value::Array(vec![scalar]),
        (_, other) => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FABRIC_SITE: &[ReverseField] = &[
        ReverseField::new("site_name_hierarchy", "siteId", Shape::Str).with(Transform::SiteIdToName),
        ReverseField::new("authentication_profile", "authenticationProfileName", Shape::Str),
        ReverseField::new("is_pub_sub_enabled", "isPubSubEnabled", Shape::Bool),
    ];

    fn lookups() -> Lookups {
        Lookups {
            site_names: HashMap::from([("S1".to_string(), "Global/USA/SJC".to_string())]),
        }
    }

    #[test]
    fn rebuilds_in_map_order() {
        let current = Record::try_from(json!({
            "isPubSubEnabled": false,
            "id": "fs-1",
            "siteId": "S1",
            "authenticationProfileName": "No Authentication"
        }))
        .unwrap();
        let record = apply(&current, FABRIC_SITE, &lookups()).unwrap();
        let keys: Vec<&String> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["site_name_hierarchy", "authentication_profile", "is_pub_sub_enabled"]
        );
        assert_eq!(record.get_str("site_name_hierarchy"), Some("Global/USA/SJC"));
    }

    #[test]
    fn unknown_site_is_an_error() {
        let current = Record::try_from(json!({"siteId": "nope"})).unwrap();
        let err = apply(&current, FABRIC_SITE, &lookups()).unwrap_err();
        assert!(err.starts_with("site_name_hierarchy"));
    }

    #[test]
    fn empty_values_are_omitted_and_shapes_applied() {
        let fields = [
            ReverseField::new("asn", "ip.asn", Shape::Int),
            ReverseField::new("description", "description", Shape::Str),
            ReverseField::new("sites", "siteIds", Shape::List).with(Transform::SiteIdsToNames),
        ];
        let current = Record::try_from(json!({
            "ip": {"asn": "65001"},
            "description": "",
            "siteIds": ["S1"]
        }))
        .unwrap();
        let record = apply(&current, &fields, &lookups()).unwrap();
        assert_eq!(record.get_i64("asn"), Some(65001));
        assert!(!record.contains("description"));
        assert_eq!(record.get("sites"), Some(&json!(["Global/USA/SJC"])));
    }
}
