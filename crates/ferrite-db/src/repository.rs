//! Transaction-scoped repository traits.
//!
//! The reconciler never touches `sqlx` directly. It opens a transaction
//! through [`ReconcileStore::begin`] and works against the repository traits
//! bundled in [`StoreTx`], so tests can substitute an in-memory store with
//! the same commit, rollback and advisory lock semantics.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    AssociationStatus, NewResource, NewSiteAssociation, NewStatusDetail,
    NewSubResourceAssociation, Resource, ResourceChanges, ResourceKind, Site, SiteAssociation,
    StatusDetail, SubResource, SubResourceAssociation,
};

/// Transaction-scoped advisory locking.
#[async_trait]
pub trait AdvisoryLock: Send {
    /// Try to take the advisory lock for `key` without blocking.
    ///
    /// Returns `false` when another transaction holds it. The lock is
    /// released when the transaction commits or rolls back.
    async fn try_advisory_xact_lock(&mut self, key: i64) -> Result<bool, DbError>;
}

/// Resource rows.
#[async_trait]
pub trait ResourceRepository: Send {
    async fn find_resource(&mut self, tenant_id: Uuid, id: Uuid) -> Result<Option<Resource>, DbError>;

    async fn find_resource_by_name(
        &mut self,
        tenant_id: Uuid,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<Resource>, DbError>;

    async fn insert_resource(&mut self, input: &NewResource) -> Result<Resource, DbError>;

    /// Apply a partial update. Fails with `DbError::NotFound` if the row is gone.
    async fn update_resource(&mut self, id: Uuid, changes: &ResourceChanges) -> Result<Resource, DbError>;

    async fn delete_resource(&mut self, id: Uuid) -> Result<bool, DbError>;
}

/// Site association rows.
#[async_trait]
pub trait SiteAssociationRepository: Send {
    /// Every association of the resource, `Deleting` ones included.
    async fn list_site_associations(&mut self, resource_id: Uuid) -> Result<Vec<SiteAssociation>, DbError>;

    async fn insert_site_association(
        &mut self,
        input: &NewSiteAssociation,
    ) -> Result<SiteAssociation, DbError>;

    async fn set_site_association_status(
        &mut self,
        id: Uuid,
        status: AssociationStatus,
    ) -> Result<SiteAssociation, DbError>;

    async fn set_site_association_version(
        &mut self,
        id: Uuid,
        version: &str,
    ) -> Result<SiteAssociation, DbError>;

    async fn delete_site_association(&mut self, id: Uuid) -> Result<bool, DbError>;
}

/// Sub-resource association rows.
#[async_trait]
pub trait SubResourceAssociationRepository: Send {
    async fn list_sub_resource_associations(
        &mut self,
        resource_id: Uuid,
    ) -> Result<Vec<SubResourceAssociation>, DbError>;

    async fn insert_sub_resource_association(
        &mut self,
        input: &NewSubResourceAssociation,
    ) -> Result<SubResourceAssociation, DbError>;

    async fn delete_sub_resource_association(&mut self, id: Uuid) -> Result<bool, DbError>;

    async fn delete_sub_resource_associations_for(&mut self, resource_id: Uuid) -> Result<u64, DbError>;
}

/// Append-only status history.
#[async_trait]
pub trait StatusDetailRepository: Send {
    async fn append_status_detail(&mut self, input: &NewStatusDetail) -> Result<StatusDetail, DbError>;

    /// Most recent `limit` rows per entity, newest first within each entity.
    async fn recent_status_details(
        &mut self,
        entity_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<StatusDetail>, DbError>;

    /// Cascade removal for purged entities.
    async fn delete_status_details_for(&mut self, entity_ids: &[Uuid]) -> Result<u64, DbError>;
}

/// Read-only lookups of sites, tenant site grants and sub-resources.
#[async_trait]
pub trait CatalogRepository: Send {
    async fn find_sites(&mut self, ids: &[Uuid]) -> Result<Vec<Site>, DbError>;

    /// Of `site_ids`, those the tenant has been granted.
    async fn accessible_site_ids(&mut self, tenant_id: Uuid, site_ids: &[Uuid]) -> Result<Vec<Uuid>, DbError>;

    async fn find_sub_resources(&mut self, ids: &[Uuid]) -> Result<Vec<SubResource>, DbError>;
}

/// An open store transaction exposing every repository.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait StoreTx:
    AdvisoryLock
    + ResourceRepository
    + SiteAssociationRepository
    + SubResourceAssociationRepository
    + StatusDetailRepository
    + CatalogRepository
    + Send
{
    /// Commit all writes and release advisory locks.
    async fn commit(self) -> Result<(), DbError>;

    /// Discard all writes and release advisory locks.
    async fn rollback(self) -> Result<(), DbError>;
}

/// Entry point for opening transactions.
#[async_trait]
pub trait ReconcileStore: Send + Sync {
    type Tx: StoreTx + 'static;

    async fn begin(&self) -> Result<Self::Tx, DbError>;
}
