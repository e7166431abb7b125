//! Site and tenant site access models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use std::fmt;
use uuid::Uuid;

/// Registration state of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    /// Site record exists but its agent has not connected yet.
    Pending,
    /// Agent connected; the site accepts workflows.
    Registered,
    /// Site is unhealthy.
    Error,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Registered => write!(f, "registered"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A remote execution site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Site {
    pub id: Uuid,
    pub name: String,
    pub status: SiteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    /// Check if the site can receive workflows.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.status == SiteStatus::Registered
    }

    /// Insert a site.
    pub async fn insert<'e, E>(executor: E, name: &str, status: SiteStatus) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("INSERT INTO sites (name, status) VALUES ($1, $2) RETURNING *")
            .bind(name)
            .bind(status)
            .fetch_one(executor)
            .await
    }

    /// Fetch the sites with the given IDs. Missing IDs are simply absent.
    pub async fn find_many<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM sites WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(executor)
            .await
    }
}

/// Grant allowing a tenant to place resources on a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TenantSite {
    pub tenant_id: Uuid,
    pub site_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TenantSite {
    /// Grant a tenant access to a site. Granting twice is a no-op.
    pub async fn grant<'e, E>(executor: E, tenant_id: Uuid, site_id: Uuid) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as(
            r"
            INSERT INTO tenant_sites (tenant_id, site_id)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, site_id) DO UPDATE SET tenant_id = EXCLUDED.tenant_id
            RETURNING *
            ",
        )
        .bind(tenant_id)
        .bind(site_id)
        .fetch_one(executor)
        .await
    }

    /// Of the given site IDs, return those the tenant may use.
    pub async fn accessible_site_ids<'e, E>(
        executor: E,
        tenant_id: Uuid,
        site_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT site_id FROM tenant_sites WHERE tenant_id = $1 AND site_id = ANY($2)",
        )
        .bind(tenant_id)
        .bind(site_ids)
        .fetch_all(executor)
        .await
    }
}
