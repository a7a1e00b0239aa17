//! Per-run context shared by every reconciler.

use std::sync::Arc;

use catalyst_core::Record;
use catalyst_transport::{TaskStatus, Transport};
use parking_lot::Mutex;
use serde_json::Value;

use crate::acquire::{collect_pages, into_records, payload_items};
use crate::config::EngineConfig;
use crate::directory::SiteDirectory;
use crate::error::{EngineError, Result};
use crate::task::{TaskHandle, TaskTracker};

/// The result of a mutating call.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Response body of the call.
    pub response: Value,
    /// Terminal task status, if the call was asynchronous.
    pub task: Option<TaskStatus>,
}

impl Mutation {
    /// Data reported by the finished task, if any.
    #[must_use]
    pub fn task_data(&self) -> Option<&Value> {
        self.task.as_ref().and_then(|t| t.data.as_ref())
    }
}

/// Transport, task tracker and caches for one run.
pub struct Context {
    transport: Arc<dyn Transport>,
    tracker: TaskTracker,
    config: EngineConfig,
    sites: Mutex<Option<Arc<SiteDirectory>>>,
}

impl Context {
    /// Create a context.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let tracker = TaskTracker::new(Arc::clone(&transport), &config);
        Self {
            transport,
            tracker,
            config,
            sites: Mutex::new(None),
        }
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Invoke a read and return the payload inside the response envelope.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the call fails.
    pub async fn query(&self, family: &str, operation: &str, params: &Record) -> Result<Value> {
        let invocation = self.transport.invoke(family, operation, params, false).await?;
        Ok(invocation.payload().clone())
    }

    /// Invoke an unpaginated list read.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the call fails.
    pub async fn list(&self, family: &str, operation: &str, params: &Record) -> Result<Vec<Record>> {
        let payload = self.query(family, operation, params).await?;
        Ok(into_records(payload_items(&payload)))
    }

    /// Invoke a paginated list read and collect every page.
    ///
    /// # Errors
    ///
    /// Returns the first transport error.
    pub async fn list_all(
        &self,
        family: &str,
        operation: &str,
        params: &Record,
    ) -> Result<Vec<Record>> {
        let items = collect_pages(self.config.page_size, |offset, limit| {
            let transport = Arc::clone(&self.transport);
            let mut page_params = params.clone();
            page_params.insert("offset", offset);
            page_params.insert("limit", limit);
            async move {
                let invocation = transport
                    .invoke(family, operation, &page_params, false)
                    .await?;
                Ok(payload_items(invocation.payload()))
            }
        })
        .await?;

        tracing::debug!(
            family = %family,
            operation = %operation,
            count = items.len(),
            "Listed controller records"
        );
        Ok(into_records(items))
    }

    /// Invoke a mutation and wait for its task, if it returned one.
    ///
    /// # Errors
    ///
    /// Returns the transport error, or the task tracker's failure or
    /// timeout.
    pub async fn mutate(&self, family: &str, operation: &str, params: &Record) -> Result<Mutation> {
        let invocation = self.transport.invoke(family, operation, params, true).await?;

        let task = match &invocation.task_id {
            Some(task_id) => {
                let handle = TaskHandle::new(task_id.clone(), invocation.task_url.clone());
                tracing::debug!(operation = %operation, task_id = %handle.id, "Waiting for task");
                Some(self.tracker.wait(&handle).await?)
            }
            None => None,
        };

        Ok(Mutation {
            response: invocation.response,
            task,
        })
    }

    /// The site directory, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the site list cannot be read.
    pub async fn sites(&self) -> Result<Arc<SiteDirectory>> {
        if let Some(directory) = self.sites.lock().clone() {
            return Ok(directory);
        }

        let records = self
            .list_all("site_design", "get_sites", &Record::new())
            .await?;
        let directory = Arc::new(SiteDirectory::from_records(&records));
        tracing::debug!(sites = directory.len(), "Loaded site directory");

        *self.sites.lock() = Some(Arc::clone(&directory));
        Ok(directory)
    }

    /// Drop the cached site directory after the hierarchy changed.
    pub fn invalidate_sites(&self) {
        *self.sites.lock() = None;
    }

    /// Resolve a site name hierarchy to its id.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference` if the site does not exist.
    pub async fn site_id(&self, name_hierarchy: &str) -> Result<String> {
        self.sites()
            .await?
            .id_of(name_hierarchy)
            .map(str::to_string)
            .ok_or_else(|| EngineError::MissingReference {
                what: "site",
                name: name_hierarchy.to_string(),
            })
    }

    /// Resolve several site name hierarchies, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `MissingReference` for the first site that does not exist.
    pub async fn site_ids(&self, names: &[Value]) -> Result<Vec<String>> {
        let directory = self.sites().await?;
        names
            .iter()
            .filter_map(Value::as_str)
            .map(|name| {
                directory
                    .id_of(name)
                    .map(str::to_string)
                    .ok_or_else(|| EngineError::MissingReference {
                        what: "site",
                        name: name.to_string(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_transport::mock::{page, task_accepted};
    use catalyst_transport::MockTransport;
    use serde_json::json;

    fn context(mock: &Arc<MockTransport>, page_size: usize) -> Context {
        let config = EngineConfig {
            page_size,
            ..EngineConfig::default()
        };
        Context::new(Arc::clone(mock) as Arc<dyn Transport>, config)
    }

    #[tokio::test]
    async fn list_all_walks_pages() {
        let mock = Arc::new(MockTransport::new());
        let items: Vec<Value> = (0..5).map(|i| json!({"id": format!("fs-{i}")})).collect();
        mock.on("sda", "get_fabric_sites", move |params| Ok(page(&items, params)));

        let ctx = context(&mock, 2);
        let records = ctx
            .list_all("sda", "get_fabric_sites", &Record::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[4].get_str("id"), Some("fs-4"));

        let offsets: Vec<i64> = mock
            .calls_to("get_fabric_sites")
            .iter()
            .filter_map(|c| c.params.get_i64("offset"))
            .collect();
        assert_eq!(offsets, [1, 3, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn mutate_waits_for_task() {
        let mock = Arc::new(MockTransport::new());
        mock.respond("sda", "add_fabric_site", task_accepted("t-1"));
        mock.script_task(
            "t-1",
            vec![
                TaskStatus::running(),
                TaskStatus::success().with_data(json!({"id": "fs-1"})),
            ],
        );

        let ctx = context(&mock, 500);
        let mutation = ctx
            .mutate("sda", "add_fabric_site", &Record::new())
            .await
            .unwrap();
        assert_eq!(mutation.task_data(), Some(&json!({"id": "fs-1"})));
        assert_eq!(mock.calls_to("get_task_by_id").len(), 2);
    }

    #[tokio::test]
    async fn sites_are_cached_until_invalidated() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            "site_design",
            "get_sites",
            json!({"response": [
                {"id": "G", "nameHierarchy": "Global", "type": "global"},
                {"id": "S1", "nameHierarchy": "Global/USA", "type": "area", "parentId": "G"}
            ]}),
        );

        let ctx = context(&mock, 500);
        assert_eq!(ctx.site_id("Global/USA").await.unwrap(), "S1");
        assert_eq!(ctx.site_id("Global").await.unwrap(), "G");
        assert_eq!(mock.calls_to("get_sites").len(), 1);

        let err = ctx.site_id("Global/Mars").await.unwrap_err();
        assert!(matches!(err, EngineError::MissingReference { what: "site", .. }));

        ctx.invalidate_sites();
        ctx.site_ids(&[json!("Global/USA")]).await.unwrap();
        assert_eq!(mock.calls_to("get_sites").len(), 2);
    }
}
