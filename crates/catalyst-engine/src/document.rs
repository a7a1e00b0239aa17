//! Declarative task documents.
//!
//! A document names a run state and lists the desired records:
//!
//! ```yaml
//! state: merged
//! config_verify: true
//! config:
//!   - site:
//!       - type: area
//!         name: USA
//!         parent_name_hierarchy: Global
//!   - ssid:
//!       ssid_name: Corp
//!       auth_type: WPA2_PERSONAL
//!       passphrase: hunter22
//! ```
//!
//! With `state: gathered`, `config` holds the extraction request instead.

use std::path::Path;

use catalyst_core::{ResourceKind, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::extract::ExtractRequest;

/// One desired record as declared in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Position among all declared records.
    pub index: usize,
    /// Resource kind.
    pub kind: ResourceKind,
    /// The record as written by the user.
    pub raw: Value,
    /// Location in the document, e.g. `config[1].ssid[0]`.
    pub path: String,
}

/// A parsed task document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDocument {
    /// Target state.
    #[serde(default)]
    pub state: State,

    /// Re-acquire and re-diff every record after the run.
    #[serde(default)]
    pub config_verify: bool,

    /// Desired records, or the extraction request when gathering.
    #[serde(default)]
    pub config: Value,
}

impl TaskDocument {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the text is not a valid task document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| EngineError::Document(e.to_string()))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the text is not a valid task document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::Document(e.to_string()))
    }

    /// Read a document from disk; `.json` files are parsed as JSON, anything
    /// else as YAML.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::Document(format!("{}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
    }

    /// Desired records in declaration order.
    ///
    /// Each element of `config` maps kind names to a record or a list of
    /// records.
    ///
    /// # Errors
    ///
    /// Returns `Document` for a malformed `config` or an unknown kind.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let items = match &self.config {
            Value::Null => return Ok(Vec::new()),
            Value::Array(items) => items,
            other => {
                return Err(EngineError::Document(format!(
                    "config must be a list, found {}",
                    type_name(other)
                )))
            }
        };

        let mut entries = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let Value::Object(group) = item else {
                return Err(EngineError::Document(format!(
                    "config[{i}] must map resource kinds to records, found {}",
                    type_name(item)
                )));
            };
            for (key, records) in group {
                let kind: ResourceKind = key
                    .parse()
                    .map_err(|e| EngineError::Document(format!("config[{i}]: {e}")))?;
                match records {
                    Value::Array(list) => {
                        for (j, raw) in list.iter().enumerate() {
                            entries.push(Entry {
                                index: entries.len(),
                                kind,
                                raw: raw.clone(),
                                path: format!("config[{i}].{key}[{j}]"),
                            });
                        }
                    }
                    Value::Null => {}
                    raw => entries.push(Entry {
                        index: entries.len(),
                        kind,
                        raw: raw.clone(),
                        path: format!("config[{i}].{key}"),
                    }),
                }
            }
        }
        Ok(entries)
    }

    /// The extraction request of a `gathered` document.
    ///
    /// `config` may be the request itself or a one-element list holding it.
    ///
    /// # Errors
    ///
    /// Returns `Document` if the request is malformed.
    pub fn extraction_request(&self) -> Result<ExtractRequest> {
        let raw = match &self.config {
            Value::Null => return Ok(ExtractRequest::default()),
            Value::Array(items) if items.len() <= 1 => {
                items.first().cloned().unwrap_or(Value::Null)
            }
            Value::Array(_) => {
                return Err(EngineError::Document(
                    "a gathered document takes a single extraction request".to_string(),
                ))
            }
            other => other.clone(),
        };
        if raw.is_null() {
            return Ok(ExtractRequest::default());
        }
        serde_json::from_value(raw)
            .map_err(|e| EngineError::Document(format!("extraction request: {e}")))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
