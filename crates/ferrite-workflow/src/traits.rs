//! Workflow engine traits.

use async_trait::async_trait;
use ferrite_core::SiteId;
use serde_json::Value;
use std::sync::Arc;

use crate::error::WorkflowResult;
use crate::types::StartOptions;

/// Handle on a started workflow execution.
#[async_trait]
pub trait WorkflowHandle: Send + Sync {
    /// Workflow ID the execution was started with.
    fn id(&self) -> &str;

    /// Run ID assigned by the engine.
    fn run_id(&self) -> Option<&str>;

    /// Block until the workflow completes and return its result.
    ///
    /// Callers bound the wait with their own deadline.
    async fn get(&self) -> WorkflowResult<Value>;
}

/// Client for one site's workflow engine.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start a workflow by name.
    async fn execute_workflow(
        &self,
        options: StartOptions,
        workflow_name: &str,
        payload: Value,
    ) -> WorkflowResult<Box<dyn WorkflowHandle>>;

    /// Terminate a running workflow execution.
    async fn terminate_workflow(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
        reason: &str,
    ) -> WorkflowResult<()>;
}

/// Resolves the workflow client for a site.
#[async_trait]
pub trait SiteClientProvider: Send + Sync {
    /// Get the client for `site_id`.
    ///
    /// Returns `WorkflowError::ClientUnavailable` when the site has no client.
    async fn client_for_site(&self, site_id: SiteId) -> WorkflowResult<Arc<dyn WorkflowClient>>;
}
