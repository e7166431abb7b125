//! Site dispatcher.
//!
//! Runs one remote workflow per affected site after the owning transaction
//! has committed. Each call is bounded by a deadline; a call that overruns
//! it triggers a best-effort terminate on its own, fresh deadline. Failures
//! are classified into the shared error taxonomy and never touch the store.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, instrument, warn};

use ferrite_core::{FerriteError, ResourceId, SiteId};
use ferrite_db::ResourceKind;
use ferrite_workflow::{SiteClientProvider, StartOptions, WorkflowClient, WorkflowError};

use crate::config::DispatchConfig;

const TERMINATE_REASON: &str = "workflow exceeded dispatch deadline";

/// Remote operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteOperation {
    /// Create or update the resource on the site.
    Sync,
    /// Remove the resource from the site.
    Delete,
}

impl SiteOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Delete => "delete",
        }
    }

    /// Workflow name registered by site agents, e.g. `DeleteKeyGroup`.
    #[must_use]
    pub fn workflow_name(&self, kind: ResourceKind) -> String {
        let verb = match self {
            Self::Sync => "Sync",
            Self::Delete => "Delete",
        };
        format!("{verb}{}", kind.pascal_name())
    }

    /// Deterministic workflow ID for one version of a resource.
    ///
    /// Re-dispatching the same version reuses the ID, which the engine
    /// deduplicates.
    #[must_use]
    pub fn workflow_id(&self, kind: ResourceKind, resource_id: ResourceId, version: &str) -> String {
        format!("{}-{}-{}-{}", kind.slug(), self.as_str(), resource_id, version)
    }
}

/// One remote operation to run on one site.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub site_id: SiteId,
    pub operation: SiteOperation,
    pub workflow_name: String,
    pub workflow_id: String,
    pub payload: Value,
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "error", rename_all = "snake_case")]
pub enum DispatchStatus {
    /// The workflow ran to completion.
    Completed,
    /// Delete found nothing to remove; the site already matches intent.
    AlreadyAbsent,
    /// The dispatch failed; persisted state is left for a later sweep.
    Failed(FerriteError),
}

impl DispatchStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Per-site report returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub site_id: SiteId,
    pub operation: SiteOperation,
    pub workflow_id: String,
    pub status: DispatchStatus,
}

impl DispatchReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The failure, if the dispatch failed.
    #[must_use]
    pub fn error(&self) -> Option<&FerriteError> {
        match &self.status {
            DispatchStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Dispatches workflows to sites with bounded parallelism.
///
/// The bound is per [`SiteDispatcher::dispatch_all`] call; concurrent calls
/// do not share permits.
#[derive(Clone)]
pub struct SiteDispatcher {
    provider: Arc<dyn SiteClientProvider>,
    config: DispatchConfig,
}

impl SiteDispatcher {
    pub fn new(provider: Arc<dyn SiteClientProvider>, config: DispatchConfig) -> Self {
        Self { provider, config }
    }

    /// The client provider this dispatcher resolves sites through.
    #[must_use]
    pub fn provider(&self) -> Arc<dyn SiteClientProvider> {
        Arc::clone(&self.provider)
    }

    /// Dispatch every request concurrently, at most `max_parallel` at a time.
    ///
    /// Reports come back in request order.
    pub async fn dispatch_all(&self, requests: Vec<DispatchRequest>) -> Vec<DispatchReport> {
        if requests.is_empty() {
            return Vec::new();
        }

        let placeholders: Vec<(SiteId, SiteOperation, String)> = requests
            .iter()
            .map(|r| (r.site_id, r.operation, r.workflow_id.clone()))
            .collect();
        let mut slots: Vec<Option<DispatchReport>> = placeholders.iter().map(|_| None).collect();

        let limiter = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut join_set = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let dispatcher = self.clone();
            let limiter = Arc::clone(&limiter);
            join_set.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                (index, dispatcher.dispatch(request).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!(error = %e, "Dispatch task panicked"),
            }
        }

        slots
            .into_iter()
            .zip(placeholders)
            .map(|(slot, (site_id, operation, workflow_id))| {
                slot.unwrap_or_else(|| DispatchReport {
                    site_id,
                    operation,
                    workflow_id,
                    status: DispatchStatus::Failed(FerriteError::infrastructure(
                        "dispatch task aborted",
                    )),
                })
            })
            .collect()
    }

    /// Run one workflow on one site and classify the outcome.
    #[instrument(skip(self, request), fields(
        site_id = %request.site_id,
        operation = request.operation.as_str(),
        workflow_id = %request.workflow_id,
    ))]
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchReport {
        let status = match self.run(&request).await {
            Ok(status) => {
                info!(result = ?status, "Dispatch finished");
                status
            }
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "Dispatch failed");
                DispatchStatus::Failed(err)
            }
        };

        DispatchReport {
            site_id: request.site_id,
            operation: request.operation,
            workflow_id: request.workflow_id,
            status,
        }
    }

    async fn run(&self, request: &DispatchRequest) -> Result<DispatchStatus, FerriteError> {
        let client = self
            .provider
            .client_for_site(request.site_id)
            .await
            .map_err(|e| FerriteError::infrastructure(e.to_string()))?;

        let deadline = Instant::now() + self.config.call_timeout();
        let options = StartOptions::new(&request.workflow_id, &self.config.task_queue)
            .with_execution_timeout(self.config.execution_timeout());

        let started = timeout_at(
            deadline,
            client.execute_workflow(options, &request.workflow_name, request.payload.clone()),
        )
        .await;
        let handle = match started {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => return self.classify(client.as_ref(), request, None, err).await,
            Err(_) => {
                return Err(self
                    .terminate_after_timeout(client.as_ref(), request, &request.workflow_id, None)
                    .await)
            }
        };

        let workflow_id = handle.id().to_string();
        let run_id = handle.run_id().map(str::to_string);
        debug!(run_id = ?run_id, "Workflow started, waiting for completion");

        match timeout_at(deadline, handle.get()).await {
            Ok(Ok(_)) => Ok(DispatchStatus::Completed),
            Ok(Err(err)) => {
                self.classify(client.as_ref(), request, run_id.as_deref(), err)
                    .await
            }
            Err(_) => Err(self
                .terminate_after_timeout(client.as_ref(), request, &workflow_id, run_id.as_deref())
                .await),
        }
    }

    async fn classify(
        &self,
        client: &dyn WorkflowClient,
        request: &DispatchRequest,
        run_id: Option<&str>,
        err: WorkflowError,
    ) -> Result<DispatchStatus, FerriteError> {
        let site_id = request.site_id;
        match err {
            WorkflowError::ObjectNotFound { message } => match request.operation {
                SiteOperation::Delete => {
                    info!(message = %message, "Object already absent on site, treating delete as done");
                    Ok(DispatchStatus::AlreadyAbsent)
                }
                SiteOperation::Sync => Err(FerriteError::TransientRemote {
                    site_id,
                    message: format!("object not found: {message}"),
                }),
            },
            WorkflowError::Unimplemented { message } | WorkflowError::Denied { message } => {
                Err(FerriteError::PermanentRemote { site_id, message })
            }
            WorkflowError::Timeout { .. } => Err(self
                .terminate_after_timeout(client, request, &request.workflow_id, run_id)
                .await),
            WorkflowError::Failed { message } => {
                Err(FerriteError::TransientRemote { site_id, message })
            }
            WorkflowError::ClientUnavailable { message, .. } => {
                Err(FerriteError::infrastructure(message))
            }
        }
    }

    /// Reap a stuck execution. The terminate call gets its own deadline so
    /// the expired one cannot starve it; its failure is only logged.
    async fn terminate_after_timeout(
        &self,
        client: &dyn WorkflowClient,
        request: &DispatchRequest,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> FerriteError {
        warn!(workflow_id, "Workflow exceeded its deadline, terminating");

        let terminated = match timeout(
            self.config.terminate_timeout(),
            client.terminate_workflow(workflow_id, run_id, TERMINATE_REASON),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(workflow_id, error = %e, "Failed to terminate timed out workflow");
                false
            }
            Err(_) => {
                error!(workflow_id, "Terminate call for timed out workflow did not return in time");
                false
            }
        };

        FerriteError::Timeout {
            site_id: request.site_id,
            terminated,
        }
    }
}
