//! ferrite Core Library
//!
//! Shared types and traits for the ferrite control plane.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (TenantId, ResourceId, SiteId, ...)
//! - [`error`] - Error taxonomy shared by every reconciliation path (FerriteError)
//! - [`desired`] - Three-state desired topology field (DesiredSet)
//! - [`version`] - Opaque optimistic-concurrency token (VersionToken)
//! - [`traits`] - Multi-tenant traits (TenantAware)
//!
//! # Example
//!
//! ```
//! use ferrite_core::{DesiredSet, FerriteError, Result, SiteId};
//!
//! let sites: DesiredSet<SiteId> = Some(vec![SiteId::new()]).into();
//! assert!(sites.is_specified());
//!
//! fn example() -> Result<()> {
//!     Err(FerriteError::conflict("stale version"))
//! }
//! assert!(example().is_err());
//! ```

pub mod desired;
pub mod error;
pub mod ids;
pub mod traits;
pub mod version;

pub use desired::DesiredSet;
pub use error::{FerriteError, Result};
pub use ids::{ResourceId, SiteId, SubResourceId, TenantId, UserId};
pub use traits::TenantAware;
pub use version::VersionToken;
