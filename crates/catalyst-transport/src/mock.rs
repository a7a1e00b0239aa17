//! In-memory controller for tests.
//!
//! `MockTransport` answers operations through handler closures registered per
//! `(family, operation)`, replays scripted task statuses, and records every
//! call in order so tests can assert on what the engine sent.
//!
//! Operations without a handler answer with an empty list for reads and an
//! accepted task for mutations.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use catalyst_core::{ControllerVersion, Record};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use crate::error::Result;
use crate::types::{Invocation, TaskStatus};
use crate::Transport;

type Handler = Box<dyn Fn(&Record) -> Result<Value> + Send + Sync>;

/// One call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// API family.
    pub family: String,
    /// Operation name.
    pub operation: String,
    /// Parameters as sent.
    pub params: Record,
    /// Whether the caller marked the call as mutating.
    pub mutates: bool,
}

/// A scripted controller.
pub struct MockTransport {
    handlers: RwLock<HashMap<(String, String), Handler>>,
    tasks: Mutex<HashMap<String, VecDeque<TaskStatus>>>,
    version: RwLock<ControllerVersion>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock reporting release 2.3.7.9.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            version: RwLock::new(ControllerVersion::V2_3_7_9),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the reported controller release.
    pub fn set_version(&self, version: ControllerVersion) {
        *self.version.write() = version;
    }

    /// Register a handler for an operation, replacing any previous one.
    pub fn on<F>(&self, family: &str, operation: &str, handler: F)
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert((family.to_string(), operation.to_string()), Box::new(handler));
    }

    /// Register a fixed response for an operation.
    pub fn respond(&self, family: &str, operation: &str, response: Value) {
        self.on(family, operation, move |_| Ok(response.clone()));
    }

    /// Script the statuses a task reports, one per poll.
    ///
    /// The last status repeats once the script runs out. Unscripted tasks
    /// succeed on the first poll.
    pub fn script_task(&self, task_id: &str, statuses: Vec<TaskStatus>) {
        self.tasks
            .lock()
            .insert(task_id.to_string(), statuses.into());
    }

    /// Every call in the order it was made, including task polls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls marked as mutating.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().iter().filter(|c| c.mutates).cloned().collect()
    }

    /// Calls to one operation.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, family: &str, operation: &str, params: &Record, mutates: bool) {
        self.calls.lock().push(RecordedCall {
            family: family.to_string(),
            operation: operation.to_string(),
            params: params.clone(),
            mutates,
        });
    }
}

/// A body announcing an accepted asynchronous task.
#[must_use]
pub fn task_accepted(task_id: &str) -> Value {
    json!({
        "response": {
            "taskId": task_id,
            "url": format!("/api/v1/task/{task_id}")
        },
        "version": "1.0"
    })
}

/// A fresh task id.
#[must_use]
pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A list body holding the window of `items` selected by the `offset`
/// (1-based) and `limit` parameters.
#[must_use]
pub fn page(items: &[Value], params: &Record) -> Value {
    let offset = params
        .get_i64("offset")
        .and_then(|o| usize::try_from(o).ok())
        .unwrap_or(1)
        .max(1);
    let limit = params
        .get_i64("limit")
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(items.len());
    let window: Vec<Value> = items.iter().skip(offset - 1).take(limit).cloned().collect();
    json!({ "response": window })
}

#[async_trait]
impl Transport for MockTransport {
    async fn invoke(
        &self,
        family: &str,
        operation: &str,
        params: &Record,
        mutates: bool,
    ) -> Result<Invocation> {
        self.record(family, operation, params, mutates);

        let body = {
            let handlers = self.handlers.read();
            match handlers.get(&(family.to_string(), operation.to_string())) {
                Some(handler) => handler(params)?,
                None if mutates => task_accepted(&new_task_id()),
                None => json!({ "response": [] }),
            }
        };
        Ok(Invocation::from_body(body))
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let params = Record::new().with("task_id", task_id);
        self.record("task", "get_task_by_id", &params, false);

        let mut tasks = self.tasks.lock();
        let status = match tasks.get_mut(task_id) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        };
        Ok(status.unwrap_or_else(TaskStatus::success))
    }

    async fn version(&self) -> Result<ControllerVersion> {
        self.record("platform", "release_summary", &Record::new(), false);
        Ok(*self.version.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unhandled_operations_have_defaults() {
        let mock = MockTransport::new();
        let read = mock
            .invoke("wireless", "get_ssids", &Record::new(), false)
            .await
            .unwrap();
        assert_eq!(read.payload(), &json!([]));
        assert!(read.task_id.is_none());

        let write = mock
            .invoke("wireless", "create_ssid", &Record::new(), true)
            .await
            .unwrap();
        assert!(write.task_id.is_some());
        assert_eq!(mock.mutating_calls().len(), 1);
    }

    #[tokio::test]
    async fn scripted_task_statuses_repeat_last() {
        let mock = MockTransport::new();
        mock.script_task("t1", vec![TaskStatus::running(), TaskStatus::failed("nope")]);

        assert_eq!(mock.task_status("t1").await.unwrap(), TaskStatus::running());
        assert!(mock.task_status("t1").await.unwrap().is_error);
        assert!(mock.task_status("t1").await.unwrap().is_error);
        assert!(!mock.task_status("other").await.unwrap().is_error);
    }

    #[tokio::test]
    async fn handlers_see_params() {
        let mock = MockTransport::new();
        mock.on("sda", "get_fabric_sites", |params| {
            Ok(json!({"response": [{"siteId": params.get_str("siteId")}]}))
        });
        let result = mock
            .invoke("sda", "get_fabric_sites", &Record::new().with("siteId", "S1"), false)
            .await
            .unwrap();
        assert_eq!(result.payload(), &json!([{"siteId": "S1"}]));
        assert_eq!(mock.calls_to("get_fabric_sites").len(), 1);
    }

    #[test]
    fn page_windows() {
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        let params = Record::new().with("offset", 3).with("limit", 2);
        assert_eq!(page(&items, &params), json!({"response": [2, 3]}));
        let params = Record::new().with("offset", 5).with("limit", 2);
        assert_eq!(page(&items, &params), json!({"response": [4]}));
    }
}
