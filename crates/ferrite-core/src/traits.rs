//! Multi-Tenant Traits
//!
//! # Example
//!
//! ```
//! use ferrite_core::{TenantAware, TenantId};
//!
//! struct KeyGroup {
//!     tenant_id: TenantId,
//! }
//!
//! impl TenantAware for KeyGroup {
//!     fn tenant_id(&self) -> TenantId {
//!         self.tenant_id
//!     }
//! }
//!
//! let tenant = TenantId::new();
//! let group = KeyGroup { tenant_id: tenant };
//! assert!(group.belongs_to(tenant));
//! ```

use crate::ids::TenantId;

/// Trait for entities that belong to a specific tenant.
pub trait TenantAware {
    /// Returns the tenant that owns this entity.
    fn tenant_id(&self) -> TenantId;

    /// Returns true when the entity is owned by `tenant`.
    fn belongs_to(&self, tenant: TenantId) -> bool {
        self.tenant_id() == tenant
    }
}
