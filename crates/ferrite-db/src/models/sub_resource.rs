//! Sub-resource model: auxiliary objects carried by a resource.

use chrono::{DateTime, Utc};
use ferrite_core::{TenantAware, TenantId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// An auxiliary tenant-owned object, such as an SSH public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubResource {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl TenantAware for SubResource {
    fn tenant_id(&self) -> TenantId {
        TenantId::from_uuid(self.tenant_id)
    }
}

impl SubResource {
    /// Insert a sub-resource.
    pub async fn insert<'e, E>(executor: E, tenant_id: Uuid, name: &str) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("INSERT INTO sub_resources (tenant_id, name) VALUES ($1, $2) RETURNING *")
            .bind(tenant_id)
            .bind(name)
            .fetch_one(executor)
            .await
    }

    /// Fetch the sub-resources with the given IDs.
    pub async fn find_many<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM sub_resources WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(executor)
            .await
    }
}
