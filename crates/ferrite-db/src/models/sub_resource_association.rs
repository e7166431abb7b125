//! Sub-resource association model. Presence is the only state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// A resource-to-sub-resource association record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubResourceAssociation {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub sub_resource_id: Uuid,
    pub tenant_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a sub-resource association.
#[derive(Debug, Clone)]
pub struct NewSubResourceAssociation {
    pub resource_id: Uuid,
    pub sub_resource_id: Uuid,
    pub tenant_id: Uuid,
    pub created_by: Option<Uuid>,
}

impl SubResourceAssociation {
    /// Insert an association.
    pub async fn insert<'e, E>(
        executor: E,
        input: &NewSubResourceAssociation,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO sub_resource_associations (resource_id, sub_resource_id, tenant_id, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(input.resource_id)
        .bind(input.sub_resource_id)
        .bind(input.tenant_id)
        .bind(input.created_by)
        .fetch_one(executor)
        .await
    }

    /// List the associations of a resource.
    pub async fn list_for_resource<'e, E>(
        executor: E,
        resource_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT * FROM sub_resource_associations
            WHERE resource_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(resource_id)
        .fetch_all(executor)
        .await
    }

    /// Remove one association.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sub_resource_associations WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every association of a resource.
    pub async fn delete_for_resource<'e, E>(executor: E, resource_id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM sub_resource_associations WHERE resource_id = $1")
            .bind(resource_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
