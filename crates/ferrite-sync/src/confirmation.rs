//! Site confirmation path.
//!
//! The reconciler only ever moves associations to `Syncing` or `Deleting`.
//! Sites (or the inventory sweep acting for them) report back here: a
//! confirmed version flips an association to `Synced`, an error flips it to
//! `Error`, and a confirmed removal deletes the row. Every report rolls the
//! resource status up from its live associations.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use ferrite_core::{FerriteError, ResourceId, SiteId, TenantId, VersionToken};
use ferrite_db::{
    AssociationStatus, ReconcileStore, Resource, ResourceChanges, ResourceRepository,
    ResourceStatus, SiteAssociation, SiteAssociationRepository, StatusDetailRepository, StoreTx,
    SubResourceAssociationRepository,
};

use crate::config::ReconcilerConfig;
use crate::guard::ConcurrencyGuard;
use crate::ledger::StatusLedger;
use crate::transaction::finish;

/// Result of a removal confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeletionConfirmation {
    /// The association row was removed by this call.
    pub association_removed: bool,
    /// The resource was purged because its last association went away.
    pub resource_purged: bool,
}

/// Overall resource status implied by its live association statuses.
///
/// No associations means nothing is pending. Errors win over in-flight
/// syncs, which win over synced.
pub fn rollup_status(statuses: impl IntoIterator<Item = AssociationStatus>) -> ResourceStatus {
    let mut any = false;
    let mut syncing = false;
    for status in statuses {
        any = true;
        match status {
            AssociationStatus::Error => return ResourceStatus::Error,
            AssociationStatus::Syncing => syncing = true,
            AssociationStatus::Synced | AssociationStatus::Deleting => {}
        }
    }
    if any && syncing {
        ResourceStatus::Syncing
    } else {
        ResourceStatus::Synced
    }
}

/// Applies site reports to stored state.
pub struct ConfirmationService<S: ReconcileStore> {
    store: Arc<S>,
    guard: ConcurrencyGuard,
    ledger: StatusLedger,
}

impl<S: ReconcileStore> ConfirmationService<S> {
    pub fn new(store: Arc<S>, config: &ReconcilerConfig) -> Self {
        Self {
            store,
            guard: ConcurrencyGuard::new(config.lock.clone()),
            ledger: StatusLedger::new(config.status_history_limit),
        }
    }

    /// A site reports it applied `version`.
    ///
    /// Fails with `Conflict` when the site confirms a version other than the
    /// one its association was last asked to apply. Reports for
    /// associations being deleted are ignored.
    #[instrument(skip(self, version), fields(version = %version))]
    pub async fn confirm_synced(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        site_id: SiteId,
        version: &VersionToken,
    ) -> Result<Resource, FerriteError> {
        let mut tx = self.store.begin().await?;
        let result = self
            .apply_synced(&mut tx, tenant_id, resource_id, site_id, version)
            .await;
        finish(tx, result).await
    }

    /// A site reports it failed to apply the resource.
    #[instrument(skip(self, message))]
    pub async fn report_error(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        site_id: SiteId,
        message: &str,
    ) -> Result<Resource, FerriteError> {
        let mut tx = self.store.begin().await?;
        let result = self
            .apply_error(&mut tx, tenant_id, resource_id, site_id, message)
            .await;
        finish(tx, result).await
    }

    /// A site reports the resource is gone.
    ///
    /// Removes the association if it is `Deleting`, and purges the resource
    /// when it is `Deleting` and no association remains. Repeated or late
    /// confirmations are no-ops.
    #[instrument(skip(self))]
    pub async fn confirm_deleted(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        site_id: SiteId,
    ) -> Result<DeletionConfirmation, FerriteError> {
        let mut tx = self.store.begin().await?;
        let result = self
            .apply_deleted(&mut tx, tenant_id, resource_id, site_id)
            .await;
        finish(tx, result).await
    }

    async fn apply_synced(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        resource_id: ResourceId,
        site_id: SiteId,
        version: &VersionToken,
    ) -> Result<Resource, FerriteError> {
        self.guard.acquire(tx, &resource_id.to_string()).await?;
        let resource = find_resource(tx, tenant_id, resource_id).await?;
        let association = find_association(tx, &resource, site_id)
            .await?
            .ok_or_else(|| FerriteError::not_found("SiteAssociation", site_id))?;

        if !association.is_live() {
            debug!(association_id = %association.id, "Association is being deleted, ignoring sync confirmation");
            return Ok(resource);
        }
        if !version.matches(association.version.as_deref()) {
            return Err(FerriteError::conflict(format!(
                "site confirmed version {version} but the association expects {}",
                association.version.as_deref().unwrap_or("none")
            )));
        }

        if association.status != AssociationStatus::Synced {
            tx.set_site_association_status(association.id, AssociationStatus::Synced)
                .await?;
            self.ledger
                .append(
                    tx,
                    association.id,
                    AssociationStatus::Synced,
                    format!("site confirmed version {version}"),
                )
                .await?;
        }
        self.rollup(tx, &resource).await
    }

    async fn apply_error(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        resource_id: ResourceId,
        site_id: SiteId,
        message: &str,
    ) -> Result<Resource, FerriteError> {
        self.guard.acquire(tx, &resource_id.to_string()).await?;
        let resource = find_resource(tx, tenant_id, resource_id).await?;
        let association = find_association(tx, &resource, site_id)
            .await?
            .ok_or_else(|| FerriteError::not_found("SiteAssociation", site_id))?;

        if !association.is_live() {
            debug!(association_id = %association.id, "Association is being deleted, ignoring error report");
            return Ok(resource);
        }

        if association.status != AssociationStatus::Error {
            tx.set_site_association_status(association.id, AssociationStatus::Error)
                .await?;
        }
        self.ledger
            .append(tx, association.id, AssociationStatus::Error, message)
            .await?;
        self.rollup(tx, &resource).await
    }

    async fn apply_deleted(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        resource_id: ResourceId,
        site_id: SiteId,
    ) -> Result<DeletionConfirmation, FerriteError> {
        self.guard.acquire(tx, &resource_id.to_string()).await?;
        let Some(resource) = tx
            .find_resource(*tenant_id.as_uuid(), *resource_id.as_uuid())
            .await?
        else {
            debug!("Resource already purged");
            return Ok(DeletionConfirmation::default());
        };
        let association = match find_association(tx, &resource, site_id).await? {
            Some(a) if !a.is_live() => a,
            _ => {
                debug!("No association awaiting deletion on this site");
                return Ok(DeletionConfirmation::default());
            }
        };

        tx.delete_status_details_for(&[association.id]).await?;
        tx.delete_site_association(association.id).await?;
        info!(association_id = %association.id, "Removed site association");

        let remaining = tx.list_site_associations(resource.id).await?;
        if resource.status.is_deleting() && remaining.is_empty() {
            purge_resource(tx, &resource, &[]).await?;
            return Ok(DeletionConfirmation {
                association_removed: true,
                resource_purged: true,
            });
        }

        self.rollup(tx, &resource).await?;
        Ok(DeletionConfirmation {
            association_removed: true,
            resource_purged: false,
        })
    }

    /// Recompute and persist the resource status, appending history only
    /// when it changes. Resources being deleted are left alone.
    async fn rollup(&self, tx: &mut S::Tx, resource: &Resource) -> Result<Resource, FerriteError> {
        if resource.status.is_deleting() {
            return Ok(resource.clone());
        }

        let associations = tx.list_site_associations(resource.id).await?;
        let status = rollup_status(
            associations
                .iter()
                .filter(|a| a.is_live())
                .map(|a| a.status),
        );
        if status == resource.status {
            return Ok(resource.clone());
        }

        let changes = ResourceChanges {
            status: Some(status),
            ..Default::default()
        };
        let updated = tx.update_resource(resource.id, &changes).await?;
        let message = match status {
            ResourceStatus::Synced => "all sites applied the current version",
            ResourceStatus::Error => "one or more sites reported an error",
            _ => "waiting for sites to apply the current version",
        };
        self.ledger.append(tx, resource.id, status, message).await?;
        info!(resource_id = %resource.id, from = %resource.status, to = %status, "Resource status rolled up");
        Ok(updated)
    }
}

async fn find_resource<T: StoreTx>(
    tx: &mut T,
    tenant_id: TenantId,
    resource_id: ResourceId,
) -> Result<Resource, FerriteError> {
    tx.find_resource(*tenant_id.as_uuid(), *resource_id.as_uuid())
        .await?
        .ok_or_else(|| FerriteError::not_found("Resource", resource_id))
}

async fn find_association<T: StoreTx>(
    tx: &mut T,
    resource: &Resource,
    site_id: SiteId,
) -> Result<Option<SiteAssociation>, FerriteError> {
    Ok(tx
        .list_site_associations(resource.id)
        .await?
        .into_iter()
        .find(|a| a.site_id == *site_id.as_uuid()))
}

/// Physically remove a resource with its sub-resource associations and the
/// status history of the resource and the given associations.
pub(crate) async fn purge_resource<T: StoreTx>(
    tx: &mut T,
    resource: &Resource,
    association_ids: &[Uuid],
) -> Result<(), FerriteError> {
    tx.delete_sub_resource_associations_for(resource.id).await?;
    let mut history_owners = vec![resource.id];
    history_owners.extend_from_slice(association_ids);
    tx.delete_status_details_for(&history_owners).await?;
    tx.delete_resource(resource.id).await?;
    info!(resource_id = %resource.id, "Purged resource");
    Ok(())
}
