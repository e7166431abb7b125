//! Site association model.
//!
//! One row per (resource, site) pair recording that the resource must exist
//! on the site, or must stop existing there once the row is `Deleting`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use std::fmt;
use uuid::Uuid;

/// Replication status of a resource on one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssociationStatus {
    Syncing,
    Synced,
    Deleting,
    Error,
}

impl AssociationStatus {
    /// Check if the association still counts toward the live topology.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Deleting)
    }
}

impl fmt::Display for AssociationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syncing => write!(f, "syncing"),
            Self::Synced => write!(f, "synced"),
            Self::Deleting => write!(f, "deleting"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A resource-to-site association record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SiteAssociation {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub site_id: Uuid,
    pub status: AssociationStatus,
    /// Version of the resource configuration this site was asked to apply.
    pub version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SiteAssociation {
    /// Check if the association still counts toward the live topology.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

/// Input for inserting a site association.
#[derive(Debug, Clone)]
pub struct NewSiteAssociation {
    pub resource_id: Uuid,
    pub site_id: Uuid,
    pub status: AssociationStatus,
    pub version: Option<String>,
}

impl SiteAssociation {
    /// Insert an association.
    pub async fn insert<'e, E>(executor: E, input: &NewSiteAssociation) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO site_associations (resource_id, site_id, status, version)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(input.resource_id)
        .bind(input.site_id)
        .bind(input.status)
        .bind(&input.version)
        .fetch_one(executor)
        .await
    }

    /// List every association of a resource, including `Deleting` ones.
    pub async fn list_for_resource<'e, E>(
        executor: E,
        resource_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            "SELECT * FROM site_associations WHERE resource_id = $1 ORDER BY created_at, id",
        )
        .bind(resource_id)
        .fetch_all(executor)
        .await
    }

    /// Set the status of an association.
    pub async fn set_status<'e, E>(
        executor: E,
        id: Uuid,
        status: AssociationStatus,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE site_associations SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(executor)
        .await
    }

    /// Stamp an association with a new configuration version.
    pub async fn set_version<'e, E>(
        executor: E,
        id: Uuid,
        version: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            UPDATE site_associations SET version = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(version)
        .fetch_optional(executor)
        .await
    }

    /// Physically remove an association.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM site_associations WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
