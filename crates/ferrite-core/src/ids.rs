//! Strongly Typed Identifiers
//!
//! Newtype wrappers around UUIDs so a site ID can never be passed where a
//! resource ID is expected.
//!
//! # Example
//!
//! ```
//! use ferrite_core::{ResourceId, SiteId};
//!
//! let resource = ResourceId::new();
//! let site = SiteId::new();
//!
//! fn requires_site(id: SiteId) -> String {
//!     id.to_string()
//! }
//!
//! let result = requires_site(site);
//! // requires_site(resource); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type.
///
/// IDs are ordered so they can key the sorted sets used by topology diffs.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for tenants.
    ///
    /// Every resource, sub-resource and site access grant is scoped to a tenant.
    ///
    /// # Example
    ///
    /// ```
    /// use ferrite_core::TenantId;
    /// use uuid::Uuid;
    ///
    /// let uuid = Uuid::new_v4();
    /// let tenant_id = TenantId::from_uuid(uuid);
    /// assert_eq!(tenant_id.as_uuid(), &uuid);
    ///
    /// let parsed: TenantId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
    /// println!("Tenant: {}", parsed);
    /// ```
    TenantId
);

define_id!(
    /// Strongly typed identifier for users (resource owners and creators).
    UserId
);

define_id!(
    /// Strongly typed identifier for tenant-owned resources replicated to sites
    /// (key groups, network security groups, partitions, OS images).
    ResourceId
);

define_id!(
    /// Strongly typed identifier for remote execution sites.
    SiteId
);

define_id!(
    /// Strongly typed identifier for auxiliary objects carried by a resource,
    /// such as the SSH keys inside a key group.
    SubResourceId
);
