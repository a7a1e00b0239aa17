//! Types returned by the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outcome of one controller operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// The decoded response body.
    pub response: Value,
    /// Task handle for asynchronous mutations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Status URL accompanying the task handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_url: Option<String>,
}

impl Invocation {
    /// Wrap a response body, extracting any task handle it carries.
    ///
    /// The controller reports handles either at the top level or inside the
    /// `response` envelope, as `taskId` or `executionId`.
    #[must_use]
    pub fn from_body(response: Value) -> Self {
        let task_id = handle_field(&response, &["taskId", "executionId"]);
        let task_url = handle_field(&response, &["url", "executionStatusUrl"]);
        Self {
            response,
            task_id,
            task_url,
        }
    }

    /// The payload inside the `response` envelope, or the whole body.
    #[must_use]
    pub fn payload(&self) -> &Value {
        self.response.get("response").unwrap_or(&self.response)
    }
}

fn handle_field(body: &Value, names: &[&str]) -> Option<String> {
    let scopes = [Some(body), body.get("response")];
    scopes.into_iter().flatten().find_map(|scope| {
        names
            .iter()
            .find_map(|name| scope.get(*name).and_then(Value::as_str))
            .map(str::to_string)
    })
}

/// A single snapshot of an asynchronous task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Explicit status on newer releases (`SUCCESS`, `FAILURE`, `PENDING`).
    #[serde(default)]
    pub status: Option<String>,
    /// Free-form progress text.
    #[serde(default)]
    pub progress: Option<String>,
    /// Controller-provided failure reason.
    #[serde(default, alias = "failureReason")]
    pub error_reason: Option<String>,
    /// Controller-provided error code.
    #[serde(default)]
    pub error_code: Option<String>,
    /// Set when the task failed.
    #[serde(default)]
    pub is_error: bool,
    /// Completion timestamp, present once the task finished.
    #[serde(default)]
    pub end_time: Option<Value>,
    /// Task-specific data, e.g. identifiers created by the task.
    #[serde(default)]
    pub data: Option<Value>,
}

impl TaskStatus {
    /// Decode a task body, unwrapping the `response` envelope if present.
    ///
    /// # Errors
    ///
    /// Returns the decoder message if the body is not a task object.
    pub fn from_body(body: &Value) -> std::result::Result<Self, String> {
        let inner = body.get("response").unwrap_or(body);
        serde_json::from_value(inner.clone()).map_err(|e| e.to_string())
    }

    /// A finished, successful task.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: Some("SUCCESS".to_string()),
            end_time: Some(Value::from(1)),
            ..Self::default()
        }
    }

    /// A finished, failed task.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some("FAILURE".to_string()),
            is_error: true,
            error_reason: Some(reason.into()),
            end_time: Some(Value::from(1)),
            ..Self::default()
        }
    }

    /// A task that is still running.
    #[must_use]
    pub fn running() -> Self {
        Self {
            status: Some("PENDING".to_string()),
            progress: Some("in progress".to_string()),
            ..Self::default()
        }
    }

    /// Attach task data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
