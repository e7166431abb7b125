//! Workflow error types
//!
//! Engines report failures with a free-form type tag. Adapters turn the tag
//! into a [`WorkflowError`] once, so the dispatcher matches on a closed enum
//! instead of inspecting strings.

use ferrite_core::SiteId;
use thiserror::Error;

/// Error returned by workflow engine calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The object the workflow acts on does not exist on the site.
    #[error("object not found: {message}")]
    ObjectNotFound { message: String },

    /// The site's agent does not implement the workflow.
    #[error("workflow not implemented: {message}")]
    Unimplemented { message: String },

    /// The site's agent refused to run the workflow.
    #[error("workflow denied: {message}")]
    Denied { message: String },

    /// The workflow or the call waiting on it exceeded its deadline.
    #[error("workflow timed out: {message}")]
    Timeout { message: String },

    /// Any other workflow failure.
    #[error("workflow failed: {message}")]
    Failed { message: String },

    /// No engine client could be resolved for the site.
    #[error("no workflow client available for site {site_id}: {message}")]
    ClientUnavailable { site_id: SiteId, message: String },
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    /// Classify an engine failure by its application error type tag.
    ///
    /// Tags are compared case-insensitively; unknown tags become `Failed`.
    pub fn from_type_tag(tag: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match tag.to_ascii_lowercase().as_str() {
            "objectnotfound" | "object_not_found" | "notfound" | "not_found" => {
                Self::ObjectNotFound { message }
            }
            "unimplemented" | "notimplemented" | "not_implemented" => {
                Self::Unimplemented { message }
            }
            "denied" | "permissiondenied" | "permission_denied" => Self::Denied { message },
            "timeout" | "deadlineexceeded" | "deadline_exceeded" => Self::Timeout { message },
            _ => Self::Failed { message },
        }
    }

    /// Check if the site will keep refusing the workflow no matter how often
    /// it is retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unimplemented { .. } | Self::Denied { .. })
    }

    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            Self::Unimplemented { .. } => "UNIMPLEMENTED",
            Self::Denied { .. } => "DENIED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Failed { .. } => "FAILED",
            Self::ClientUnavailable { .. } => "CLIENT_UNAVAILABLE",
        }
    }
}
