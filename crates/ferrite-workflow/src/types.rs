//! Workflow start options and run references.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for starting a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    /// Workflow ID. Starting a second execution with the same ID is a no-op
    /// on the engine side, which makes dispatch retries idempotent.
    pub id: String,
    /// Task queue the site agent polls.
    pub task_queue: String,
    /// Upper bound on the whole workflow execution.
    pub execution_timeout: Duration,
}

impl StartOptions {
    /// Create start options for a workflow ID and task queue.
    pub fn new(id: impl Into<String>, task_queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_queue: task_queue.into(),
            execution_timeout: Duration::from_secs(60),
        }
    }

    /// Set the execution timeout.
    #[must_use]
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }
}

/// Reference to one workflow execution, used for termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: String,
    /// Run ID, when the engine has assigned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}
