//! PostgreSQL store.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    AssociationStatus, NewResource, NewSiteAssociation, NewStatusDetail,
    NewSubResourceAssociation, Resource, ResourceChanges, ResourceKind, Site, SiteAssociation,
    StatusDetail, SubResource, SubResourceAssociation, TenantSite,
};
use crate::pool::DbPool;
use crate::repository::{
    AdvisoryLock, CatalogRepository, ReconcileStore, ResourceRepository,
    SiteAssociationRepository, StatusDetailRepository, StoreTx, SubResourceAssociationRepository,
};

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ReconcileStore for PgStore {
    type Tx = PgStoreTx;

    async fn begin(&self) -> Result<PgStoreTx, DbError> {
        let tx = self
            .pool
            .inner()
            .begin()
            .await
            .map_err(DbError::TransactionFailed)?;
        Ok(PgStoreTx { tx })
    }
}

/// Open PostgreSQL transaction.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AdvisoryLock for PgStoreTx {
    async fn try_advisory_xact_lock(&mut self, key: i64) -> Result<bool, DbError> {
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(key)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(acquired)
    }
}

#[async_trait]
impl ResourceRepository for PgStoreTx {
    async fn find_resource(&mut self, tenant_id: Uuid, id: Uuid) -> Result<Option<Resource>, DbError> {
        Ok(Resource::find_by_id(&mut *self.tx, tenant_id, id).await?)
    }

    async fn find_resource_by_name(
        &mut self,
        tenant_id: Uuid,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<Resource>, DbError> {
        Ok(Resource::find_by_name(&mut *self.tx, tenant_id, kind, name).await?)
    }

    async fn insert_resource(&mut self, input: &NewResource) -> Result<Resource, DbError> {
        Ok(Resource::insert(&mut *self.tx, input).await?)
    }

    async fn update_resource(&mut self, id: Uuid, changes: &ResourceChanges) -> Result<Resource, DbError> {
        Resource::update(&mut *self.tx, id, changes)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Resource {id}")))
    }

    async fn delete_resource(&mut self, id: Uuid) -> Result<bool, DbError> {
        Ok(Resource::delete(&mut *self.tx, id).await?)
    }
}

#[async_trait]
impl SiteAssociationRepository for PgStoreTx {
    async fn list_site_associations(&mut self, resource_id: Uuid) -> Result<Vec<SiteAssociation>, DbError> {
        Ok(SiteAssociation::list_for_resource(&mut *self.tx, resource_id).await?)
    }

    async fn insert_site_association(
        &mut self,
        input: &NewSiteAssociation,
    ) -> Result<SiteAssociation, DbError> {
        Ok(SiteAssociation::insert(&mut *self.tx, input).await?)
    }

    async fn set_site_association_status(
        &mut self,
        id: Uuid,
        status: AssociationStatus,
    ) -> Result<SiteAssociation, DbError> {
        SiteAssociation::set_status(&mut *self.tx, id, status)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("SiteAssociation {id}")))
    }

    async fn set_site_association_version(
        &mut self,
        id: Uuid,
        version: &str,
    ) -> Result<SiteAssociation, DbError> {
        SiteAssociation::set_version(&mut *self.tx, id, version)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("SiteAssociation {id}")))
    }

    async fn delete_site_association(&mut self, id: Uuid) -> Result<bool, DbError> {
        Ok(SiteAssociation::delete(&mut *self.tx, id).await?)
    }
}

#[async_trait]
impl SubResourceAssociationRepository for PgStoreTx {
    async fn list_sub_resource_associations(
        &mut self,
        resource_id: Uuid,
    ) -> Result<Vec<SubResourceAssociation>, DbError> {
        Ok(SubResourceAssociation::list_for_resource(&mut *self.tx, resource_id).await?)
    }

    async fn insert_sub_resource_association(
        &mut self,
        input: &NewSubResourceAssociation,
    ) -> Result<SubResourceAssociation, DbError> {
        Ok(SubResourceAssociation::insert(&mut *self.tx, input).await?)
    }

    async fn delete_sub_resource_association(&mut self, id: Uuid) -> Result<bool, DbError> {
        Ok(SubResourceAssociation::delete(&mut *self.tx, id).await?)
    }

    async fn delete_sub_resource_associations_for(&mut self, resource_id: Uuid) -> Result<u64, DbError> {
        Ok(SubResourceAssociation::delete_for_resource(&mut *self.tx, resource_id).await?)
    }
}

#[async_trait]
impl StatusDetailRepository for PgStoreTx {
    async fn append_status_detail(&mut self, input: &NewStatusDetail) -> Result<StatusDetail, DbError> {
        Ok(StatusDetail::append(&mut *self.tx, input).await?)
    }

    async fn recent_status_details(
        &mut self,
        entity_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<StatusDetail>, DbError> {
        Ok(StatusDetail::recent_for(&mut *self.tx, entity_ids, limit).await?)
    }

    async fn delete_status_details_for(&mut self, entity_ids: &[Uuid]) -> Result<u64, DbError> {
        Ok(StatusDetail::delete_for(&mut *self.tx, entity_ids).await?)
    }
}

#[async_trait]
impl CatalogRepository for PgStoreTx {
    async fn find_sites(&mut self, ids: &[Uuid]) -> Result<Vec<Site>, DbError> {
        Ok(Site::find_many(&mut *self.tx, ids).await?)
    }

    async fn accessible_site_ids(&mut self, tenant_id: Uuid, site_ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        Ok(TenantSite::accessible_site_ids(&mut *self.tx, tenant_id, site_ids).await?)
    }

    async fn find_sub_resources(&mut self, ids: &[Uuid]) -> Result<Vec<SubResource>, DbError> {
        Ok(SubResource::find_many(&mut *self.tx, ids).await?)
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await.map_err(DbError::TransactionFailed)
    }

    async fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback().await.map_err(DbError::TransactionFailed)
    }
}
