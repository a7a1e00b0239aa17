//! Task tracking.
//!
//! Mutations on the controller are often asynchronous: the call returns a
//! task id and the real work happens later. [`TaskTracker::wait`] polls the
//! task until it reaches a terminal state or the deadline passes. A timed-out
//! task is not cancelled on the controller; the next run's acquisition will
//! observe whatever it eventually did.

use std::sync::Arc;
use std::time::Duration;

use catalyst_transport::{TaskStatus, Transport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// A submitted asynchronous task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    /// Task id.
    pub id: String,
    /// When the task was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Status URL, if the controller supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TaskHandle {
    /// A handle submitted now.
    #[must_use]
    pub fn new(id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            id: id.into(),
            submitted_at: Utc::now(),
            url,
        }
    }
}

/// Interpretation of one status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Still running.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Nothing recognisable in the snapshot.
    Unknown,
}

/// Classify a status snapshot.
///
/// An explicit `status` wins; otherwise `isError`, `endTime` and `progress`
/// are consulted in that order.
#[must_use]
pub fn classify(status: &TaskStatus) -> TaskState {
    if let Some(explicit) = status.status.as_deref() {
        match explicit.to_ascii_uppercase().as_str() {
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" => return TaskState::Succeeded,
            "FAILURE" | "FAILED" => return TaskState::Failed,
            "PENDING" | "IN_PROGRESS" | "RUNNING" => return TaskState::Running,
            _ => {}
        }
    }
    if status.is_error {
        TaskState::Failed
    } else if status.end_time.is_some() {
        TaskState::Succeeded
    } else if status.progress.is_some() {
        TaskState::Running
    } else {
        TaskState::Unknown
    }
}

/// Polls tasks to a terminal state.
#[derive(Clone)]
pub struct TaskTracker {
    transport: Arc<dyn Transport>,
    interval: Duration,
    deadline: Duration,
    max_unknown_polls: u32,
}

impl TaskTracker {
    /// Create a tracker from engine configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: &EngineConfig) -> Self {
        Self {
            transport,
            interval: config.poll_interval(),
            deadline: config.task_timeout(),
            max_unknown_polls: config.max_unknown_polls,
        }
    }

    /// Wait for a task to finish.
    ///
    /// # Errors
    ///
    /// Returns `TaskFailed` with the controller's reason, `TaskTimedOut` once
    /// the deadline passes, `TaskStatusUnknown` after too many unrecognisable
    /// snapshots, or the transport error if a poll fails.
    pub async fn wait(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let started = Instant::now();
        let mut unknown: u32 = 0;
        let mut polls: u32 = 0;

        loop {
            let status = self.transport.task_status(&handle.id).await?;
            polls += 1;

            match classify(&status) {
                TaskState::Succeeded => {
                    tracing::debug!(task_id = %handle.id, polls = polls, "Task succeeded");
                    return Ok(status);
                }
                TaskState::Failed => {
                    let reason = status
                        .error_reason
                        .clone()
                        .or_else(|| status.progress.clone())
                        .unwrap_or_else(|| "task failed without a reason".to_string());
                    tracing::warn!(
                        task_id = %handle.id,
                        reason = %reason,
                        code = status.error_code.as_deref().unwrap_or("-"),
                        "Task failed"
                    );
                    return Err(EngineError::TaskFailed {
                        task_id: handle.id.clone(),
                        reason,
                        code: status.error_code,
                    });
                }
                TaskState::Running => unknown = 0,
                TaskState::Unknown => {
                    unknown += 1;
                    if unknown > self.max_unknown_polls {
                        return Err(EngineError::TaskStatusUnknown {
                            task_id: handle.id.clone(),
                            polls: unknown,
                        });
                    }
                }
            }

            if started.elapsed() >= self.deadline {
                tracing::warn!(
                    task_id = %handle.id,
                    waited_secs = self.deadline.as_secs(),
                    "Task deadline exceeded"
                );
                return Err(EngineError::TaskTimedOut {
                    task_id: handle.id.clone(),
                    waited_secs: self.deadline.as_secs(),
                });
            }

            tracing::trace!(task_id = %handle.id, polls = polls, "Task still running");
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_transport::MockTransport;

    fn tracker(mock: Arc<MockTransport>) -> TaskTracker {
        TaskTracker::new(mock, &EngineConfig::default())
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&TaskStatus::success()), TaskState::Succeeded);
        assert_eq!(classify(&TaskStatus::failed("x")), TaskState::Failed);
        assert_eq!(classify(&TaskStatus::running()), TaskState::Running);
        assert_eq!(classify(&TaskStatus::default()), TaskState::Unknown);

        let legacy = TaskStatus {
            progress: Some("done".into()),
            end_time: Some(serde_json::json!(1)),
            ..TaskStatus::default()
        };
        assert_eq!(classify(&legacy), TaskState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_running_states() {
        let mock = Arc::new(MockTransport::new());
        mock.script_task(
            "t1",
            vec![TaskStatus::running(), TaskStatus::running(), TaskStatus::success()],
        );
        let status = tracker(mock.clone())
            .wait(&TaskHandle::new("t1", None))
            .await
            .unwrap();
        assert_eq!(classify(&status), TaskState::Succeeded);
        assert_eq!(mock.calls_to("get_task_by_id").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_carries_reason() {
        let mock = Arc::new(MockTransport::new());
        mock.script_task("t2", vec![TaskStatus::failed("NCSP10250: duplicate name")]);
        let err = tracker(mock)
            .wait(&TaskHandle::new("t2", None))
            .await
            .unwrap_err();
        match err {
            EngineError::TaskFailed { reason, .. } => {
                assert_eq!(reason, "NCSP10250: duplicate name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_enforced() {
        let mock = Arc::new(MockTransport::new());
        mock.script_task("t3", vec![TaskStatus::running()]);
        let config = EngineConfig {
            task_timeout_seconds: 10,
            ..EngineConfig::default()
        };
        let err = TaskTracker::new(mock.clone(), &config)
            .wait(&TaskHandle::new("t3", None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TaskTimedOut { waited_secs: 10, .. }));
        // one poll at t=0 and one after every 2s interval up to the deadline
        assert_eq!(mock.calls_to("get_task_by_id").len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_states_give_up() {
        let mock = Arc::new(MockTransport::new());
        mock.script_task("t4", vec![TaskStatus::default()]);
        let err = tracker(mock)
            .wait(&TaskHandle::new("t4", None))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TaskStatusUnknown { polls: 6, .. }));
    }
}
