//! Error Types
//!
//! One taxonomy is shared by the reconciler, the site dispatcher and the
//! confirmation path so callers can tell business rejections apart from
//! infrastructure trouble and from remote failures that happen after commit.
//!
//! # Example
//!
//! ```
//! use ferrite_core::{FerriteError, Result};
//!
//! fn check_name(name: &str) -> Result<()> {
//!     if name.trim().is_empty() {
//!         return Err(FerriteError::validation("name", "must not be empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_name("  ").is_err());
//! ```

use crate::ids::SiteId;
use serde::Serialize;
use thiserror::Error;

/// Standardized error type for ferrite.
///
/// # Variants
///
/// - `Validation` - Malformed request, rejected before a transaction opens (HTTP 400)
/// - `Conflict` - Name collision or stale version token (HTTP 409)
/// - `NotFound` - Target entity does not exist (HTTP 404)
/// - `Infrastructure` - Store, lock or commit failure; retryable (HTTP 503)
/// - `PermanentRemote` - Site refused the operation as unimplemented or denied (HTTP 502)
/// - `TransientRemote` - Any other remote failure (HTTP 502)
/// - `Timeout` - Remote operation exceeded its deadline (HTTP 504)
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FerriteError {
    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },

    /// The request conflicts with stored state.
    ///
    /// Raised for duplicate names and for version tokens that no longer match.
    /// The transaction is rolled back and nothing is dispatched.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Requested entity was not found.
    #[error("{resource} not found{}", id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    NotFound {
        /// The kind of entity that was not found (e.g., "Resource", "SiteAssociation")
        resource: String,
        /// Optional identifier of the entity
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Store unavailable, lock acquisition failure, commit failure or an
    /// unreachable workflow client. Fully retryable by the caller.
    #[error("Infrastructure failure: {message}")]
    Infrastructure { message: String },

    /// The site does not implement or refuses the operation.
    ///
    /// Not retried automatically; operators have to intervene.
    #[error("Site {site_id} rejected the operation: {message}")]
    PermanentRemote { site_id: SiteId, message: String },

    /// Remote failure expected to clear up on a later reconciliation pass.
    #[error("Site {site_id} operation failed: {message}")]
    TransientRemote { site_id: SiteId, message: String },

    /// Remote operation did not finish before its deadline.
    ///
    /// `terminated` records whether the best-effort termination succeeded.
    #[error("Site {site_id} operation timed out{}", if *terminated { " and was terminated" } else { "" })]
    Timeout { site_id: SiteId, terminated: bool },
}

impl FerriteError {
    /// Shorthand for a `Validation` error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a `Conflict` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` error with an identifier.
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.to_string()),
        }
    }

    /// Shorthand for an `Infrastructure` error.
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }

    /// Check if retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Infrastructure { .. } | Self::TransientRemote { .. } | Self::Timeout { .. }
        )
    }

    /// Check if this error came from a remote site after the local commit.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::PermanentRemote { .. } | Self::TransientRemote { .. } | Self::Timeout { .. }
        )
    }

    /// The site a remote error is attributed to.
    #[must_use]
    pub fn site_id(&self) -> Option<SiteId> {
        match self {
            Self::PermanentRemote { site_id, .. }
            | Self::TransientRemote { site_id, .. }
            | Self::Timeout { site_id, .. } => Some(*site_id),
            _ => None,
        }
    }

    /// HTTP status code used by the API layer.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::Infrastructure { .. } => 503,
            Self::PermanentRemote { .. } | Self::TransientRemote { .. } => 502,
            Self::Timeout { .. } => 504,
        }
    }

    /// Stable error code for logs and API payloads.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Infrastructure { .. } => "INFRASTRUCTURE",
            Self::PermanentRemote { .. } => "REMOTE_PERMANENT",
            Self::TransientRemote { .. } => "REMOTE_TRANSIENT",
            Self::Timeout { .. } => "REMOTE_TIMEOUT",
        }
    }
}

/// Type alias for Results using `FerriteError`.
pub type Result<T> = std::result::Result<T, FerriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    mod display_tests {
        use super::*;

        #[test]
        fn test_not_found_without_id() {
            let error = FerriteError::NotFound {
                resource: "Resource".to_string(),
                id: None,
            };
            assert_eq!(error.to_string(), "Resource not found");
        }

        #[test]
        fn test_not_found_with_id() {
            let error = FerriteError::not_found("Resource", "abc");
            assert_eq!(error.to_string(), "Resource not found: abc");
        }

        #[test]
        fn test_validation_names_field() {
            let error = FerriteError::validation("name", "must not be empty");
            assert_eq!(
                error.to_string(),
                "Validation error on field 'name': must not be empty"
            );
        }

        #[test]
        fn test_timeout_mentions_termination() {
            let site_id = SiteId::new();
            let terminated = FerriteError::Timeout {
                site_id,
                terminated: true,
            };
            let abandoned = FerriteError::Timeout {
                site_id,
                terminated: false,
            };
            assert!(terminated.to_string().ends_with("timed out and was terminated"));
            assert!(abandoned.to_string().ends_with("timed out"));
        }
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn test_business_errors_are_not_retryable() {
            assert!(!FerriteError::validation("f", "m").is_retryable());
            assert!(!FerriteError::conflict("stale").is_retryable());
            assert!(!FerriteError::not_found("Resource", 1).is_retryable());
        }

        #[test]
        fn test_infrastructure_and_transient_are_retryable() {
            let site_id = SiteId::new();
            assert!(FerriteError::infrastructure("pool closed").is_retryable());
            assert!(FerriteError::TransientRemote {
                site_id,
                message: "boom".into()
            }
            .is_retryable());
            assert!(FerriteError::Timeout {
                site_id,
                terminated: false
            }
            .is_retryable());
        }

        #[test]
        fn test_permanent_remote_is_remote_but_not_retryable() {
            let site_id = SiteId::new();
            let error = FerriteError::PermanentRemote {
                site_id,
                message: "unimplemented".into(),
            };
            assert!(error.is_remote());
            assert!(!error.is_retryable());
            assert_eq!(error.site_id(), Some(site_id));
        }

        #[test]
        fn test_status_codes() {
            assert_eq!(FerriteError::validation("f", "m").status_code(), 400);
            assert_eq!(FerriteError::conflict("c").status_code(), 409);
            assert_eq!(FerriteError::not_found("Resource", 1).status_code(), 404);
            assert_eq!(FerriteError::infrastructure("i").status_code(), 503);
            assert_eq!(
                FerriteError::Timeout {
                    site_id: SiteId::new(),
                    terminated: true
                }
                .status_code(),
                504
            );
        }
    }

    mod serialization_tests {
        use super::*;

        #[test]
        fn test_serializes_with_type_tag() {
            let json = serde_json::to_value(FerriteError::conflict("stale version")).unwrap();
            assert_eq!(json["type"], "conflict");
            assert_eq!(json["message"], "stale version");
        }

        #[test]
        fn test_not_found_skips_missing_id() {
            let json = serde_json::to_value(FerriteError::NotFound {
                resource: "Site".into(),
                id: None,
            })
            .unwrap();
            assert!(json.get("id").is_none());
        }
    }
}
