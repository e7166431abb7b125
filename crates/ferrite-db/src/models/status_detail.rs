//! Status detail model: append-only status history.
//!
//! Rows are keyed by a polymorphic entity ID (a resource or a site
//! association) and are only ever removed together with their entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

/// One recorded status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StatusDetail {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a status detail.
#[derive(Debug, Clone)]
pub struct NewStatusDetail {
    pub entity_id: Uuid,
    pub status: String,
    pub message: Option<String>,
}

impl StatusDetail {
    /// Append a status detail.
    pub async fn append<'e, E>(executor: E, input: &NewStatusDetail) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO status_details (entity_id, status, message)
            VALUES ($1, $2, $3)
            RETURNING *
            ",
        )
        .bind(input.entity_id)
        .bind(&input.status)
        .bind(&input.message)
        .fetch_one(executor)
        .await
    }

    /// Most recent `limit` details per entity, newest first within each entity.
    pub async fn recent_for<'e, E>(
        executor: E,
        entity_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            SELECT id, entity_id, status, message, created_at
            FROM (
                SELECT sd.*,
                       ROW_NUMBER() OVER (
                           PARTITION BY sd.entity_id
                           ORDER BY sd.created_at DESC, sd.id DESC
                       ) AS rn
                FROM status_details sd
                WHERE sd.entity_id = ANY($1)
            ) ranked
            WHERE rn <= $2
            ORDER BY entity_id, created_at DESC, id DESC
            ",
        )
        .bind(entity_ids)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// Remove the history of purged entities.
    pub async fn delete_for<'e, E>(executor: E, entity_ids: &[Uuid]) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM status_details WHERE entity_id = ANY($1)")
            .bind(entity_ids)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
