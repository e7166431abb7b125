//! Resource model.
//!
//! A tenant-owned object replicated to one or more sites.

use chrono::{DateTime, Utc};
use ferrite_core::{TenantAware, TenantId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use std::fmt;
use uuid::Uuid;

/// Kind of replicated resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Group of SSH keys installed on site hosts.
    KeyGroup,
    /// Network security group rules.
    NetworkSecurityGroup,
    /// InfiniBand partition.
    InfinibandPartition,
    /// Operating system image.
    OperatingSystem,
}

impl ResourceKind {
    /// Kebab-case slug used in workflow IDs.
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::KeyGroup => "key-group",
            Self::NetworkSecurityGroup => "network-security-group",
            Self::InfinibandPartition => "infiniband-partition",
            Self::OperatingSystem => "operating-system",
        }
    }

    /// PascalCase name used to build workflow names (`SyncKeyGroup`).
    #[must_use]
    pub fn pascal_name(&self) -> &'static str {
        match self {
            Self::KeyGroup => "KeyGroup",
            Self::NetworkSecurityGroup => "NetworkSecurityGroup",
            Self::InfinibandPartition => "InfinibandPartition",
            Self::OperatingSystem => "OperatingSystem",
        }
    }

    /// Human-readable label for status messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeyGroup => "key group",
            Self::NetworkSecurityGroup => "network security group",
            Self::InfinibandPartition => "InfiniBand partition",
            Self::OperatingSystem => "operating system",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyGroup => write!(f, "key_group"),
            Self::NetworkSecurityGroup => write!(f, "network_security_group"),
            Self::InfinibandPartition => write!(f, "infiniband_partition"),
            Self::OperatingSystem => write!(f, "operating_system"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "key_group" => Ok(Self::KeyGroup),
            "network_security_group" => Ok(Self::NetworkSecurityGroup),
            "infiniband_partition" => Ok(Self::InfinibandPartition),
            "operating_system" => Ok(Self::OperatingSystem),
            _ => Err(format!("Unknown resource kind: {s}")),
        }
    }
}

/// Overall status of a resource across its sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Accepted, nothing written to sites yet.
    Pending,
    /// At least one site still has to apply the current version.
    Syncing,
    /// Every site has applied the current version.
    Synced,
    /// Removal from sites in progress.
    Deleting,
    /// At least one site reported an error.
    Error,
}

impl ResourceStatus {
    /// Check if the resource is being torn down.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        matches!(self, Self::Deleting)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Syncing => write!(f, "syncing"),
            Self::Synced => write!(f, "synced"),
            Self::Deleting => write!(f, "deleting"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A replicated resource record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Resource {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: ResourceKind,
    pub name: String,
    pub description: Option<String>,
    pub status: ResourceStatus,
    /// Null until the first topology write.
    pub version: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantAware for Resource {
    fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }
}

/// Input for inserting a resource.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: ResourceKind,
    pub name: String,
    pub description: Option<String>,
    pub status: ResourceStatus,
    pub created_by: Option<Uuid>,
}

/// Partial update of a resource. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ResourceStatus>,
    pub version: Option<String>,
}

impl ResourceChanges {
    /// Check if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.version.is_none()
    }
}

impl Resource {
    /// Insert a resource.
    pub async fn insert<'e, E>(executor: E, input: &NewResource) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO resources (id, tenant_id, kind, name, description, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            ",
        )
        .bind(input.id)
        .bind(input.tenant_id)
        .bind(input.kind)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.status)
        .bind(input.created_by)
        .fetch_one(executor)
        .await
    }

    /// Find a resource by ID within a tenant.
    pub async fn find_by_id<'e, E>(
        executor: E,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM resources WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(executor)
            .await
    }

    /// Find a resource by name within a tenant and kind.
    pub async fn find_by_name<'e, E>(
        executor: E,
        tenant_id: Uuid,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT * FROM resources
            WHERE tenant_id = $1 AND kind = $2 AND name = $3
            LIMIT 1
            ",
        )
        .bind(tenant_id)
        .bind(kind)
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    /// Apply a partial update.
    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        changes: &ResourceChanges,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE resources SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                version = COALESCE($5, version),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.status)
        .bind(&changes.version)
        .fetch_optional(executor)
        .await
    }

    /// Physically remove a resource. Associations cascade.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
