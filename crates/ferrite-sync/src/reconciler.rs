//! Resource reconciler.
//!
//! Entry point for create, update, delete and read of site-replicated
//! resources. Every mutation follows the same shape:
//!
//! 1. Validate the request before touching the store.
//! 2. Open a transaction and take the resource's advisory lock.
//! 3. Diff desired against stored associations, write the resulting
//!    associations, a fresh version token and status history.
//! 4. Commit, then fan the remote workflows out to the affected sites.
//!
//! Remote calls never run inside the transaction. Their outcome is reported
//! next to the committed view; associations stay `Syncing` or `Deleting`
//! until a site confirms through [`ConfirmationService`].

use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::iter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ferrite_core::{FerriteError, ResourceId, SiteId, SubResourceId, TenantId};
use ferrite_db::{
    AssociationStatus, CatalogRepository, NewResource, NewSiteAssociation,
    NewSubResourceAssociation, ReconcileStore, Resource, ResourceChanges, ResourceKind,
    ResourceRepository, ResourceStatus, Site, SiteAssociation, SiteAssociationRepository,
    StoreTx, SubResourceAssociation, SubResourceAssociationRepository,
};
use ferrite_workflow::SiteClientProvider;

use crate::confirmation::{purge_resource, ConfirmationService};
use crate::config::{ReconcilerConfig, NAME_COLUMN_LENGTH};
use crate::diff::TopologyDiff;
use crate::dispatcher::{DispatchReport, DispatchRequest, SiteDispatcher, SiteOperation};
use crate::guard::ConcurrencyGuard;
use crate::ledger::StatusLedger;
use crate::outcome::{DeleteOutcome, ReconcileOutcome};
use crate::request::{CreateResourceRequest, DeleteResourceRequest, UpdateResourceRequest};
use crate::transaction::finish;
use crate::version::{Topology, VersionAllocator};
use crate::view::{load_view, ResourceView};

/// Committed state plus the remote work it implies.
struct Plan {
    view: ResourceView,
    requests: Vec<DispatchRequest>,
}

enum DeletePlan {
    /// No site held the resource; it was removed in the transaction.
    Purged,
    Dispatch(Vec<DispatchRequest>),
}

/// Lock key serializing creation and renames onto one name.
fn name_lock(tenant_id: Uuid, kind: ResourceKind, name: &str) -> String {
    format!("{tenant_id}:{kind}:{name}")
}

/// Reconciles desired resource topology with stored state and sites.
pub struct Reconciler<S: ReconcileStore> {
    store: Arc<S>,
    dispatcher: SiteDispatcher,
    guard: ConcurrencyGuard,
    ledger: StatusLedger,
    versions: VersionAllocator,
    confirmations: ConfirmationService<S>,
    config: ReconcilerConfig,
}

impl<S: ReconcileStore> Reconciler<S> {
    /// Create a reconciler with default configuration.
    pub fn new(store: Arc<S>, provider: Arc<dyn SiteClientProvider>) -> Self {
        Self::build(store, provider, ReconcilerConfig::default())
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(self, config: ReconcilerConfig) -> Self {
        Self::build(self.store, self.dispatcher.provider(), config)
    }

    fn build(store: Arc<S>, provider: Arc<dyn SiteClientProvider>, config: ReconcilerConfig) -> Self {
        Self {
            dispatcher: SiteDispatcher::new(provider, config.dispatch.clone()),
            guard: ConcurrencyGuard::new(config.lock.clone()),
            ledger: StatusLedger::new(config.status_history_limit),
            versions: VersionAllocator::new(),
            confirmations: ConfirmationService::new(Arc::clone(&store), &config),
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    fn max_name_length(&self) -> usize {
        self.config.max_name_length.min(NAME_COLUMN_LENGTH)
    }

    /// Confirmation path for site reports.
    #[must_use]
    pub fn confirmations(&self) -> &ConfirmationService<S> {
        &self.confirmations
    }

    /// Create a resource and sync it to its desired sites.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, kind = %request.kind))]
    pub async fn create(&self, request: CreateResourceRequest) -> Result<ReconcileOutcome, FerriteError> {
        request.validate(self.max_name_length())?;

        let resource_id = ResourceId::new();
        let mut tx = self.store.begin().await?;
        let result = self.persist_create(&mut tx, resource_id, &request).await;
        let plan = finish(tx, result).await?;

        info!(
            resource_id = %resource_id,
            sites = plan.requests.len(),
            "Resource created"
        );

        let dispatches = self.dispatcher.dispatch_all(plan.requests).await;
        Ok(ReconcileOutcome {
            view: plan.view,
            dispatches,
        })
    }

    /// Update scalar fields and/or topology of a resource.
    ///
    /// The request must carry the current version. Scalar-only changes keep
    /// the version and dispatch nothing.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, resource_id = %request.resource_id))]
    pub async fn update(&self, request: UpdateResourceRequest) -> Result<ReconcileOutcome, FerriteError> {
        request.validate(self.max_name_length())?;

        let mut tx = self.store.begin().await?;
        let result = self.persist_update(&mut tx, &request).await;
        let plan = finish(tx, result).await?;

        let dispatches = self.dispatcher.dispatch_all(plan.requests).await;
        self.settle_deletes(request.tenant_id, request.resource_id, &dispatches)
            .await;

        info!(dispatched = dispatches.len(), "Resource updated");
        Ok(ReconcileOutcome {
            view: plan.view,
            dispatches,
        })
    }

    /// Delete a resource from every site, then remove it.
    ///
    /// A resource with no associations is removed immediately. Otherwise it
    /// is marked `Deleting` and removed once the last site confirms.
    /// Calling delete again on a `Deleting` resource re-dispatches removal
    /// to the sites still pending.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, resource_id = %request.resource_id))]
    pub async fn delete(&self, request: DeleteResourceRequest) -> Result<DeleteOutcome, FerriteError> {
        if request.version.as_ref().is_some_and(|v| v.is_empty()) {
            return Err(FerriteError::validation("version", "must not be empty"));
        }

        let mut tx = self.store.begin().await?;
        let result = self.persist_delete(&mut tx, &request).await;
        let plan = finish(tx, result).await?;

        match plan {
            DeletePlan::Purged => {
                info!("Resource had no site associations, removed");
                Ok(DeleteOutcome {
                    resource_id: request.resource_id,
                    purged: true,
                    dispatches: Vec::new(),
                })
            }
            DeletePlan::Dispatch(requests) => {
                let dispatches = self.dispatcher.dispatch_all(requests).await;
                let purged = self
                    .settle_deletes(request.tenant_id, request.resource_id, &dispatches)
                    .await;
                info!(dispatched = dispatches.len(), purged, "Resource deletion dispatched");
                Ok(DeleteOutcome {
                    resource_id: request.resource_id,
                    purged,
                    dispatches,
                })
            }
        }
    }

    /// Read a resource with its associations and recent history.
    #[instrument(skip(self))]
    pub async fn get(&self, tenant_id: TenantId, resource_id: ResourceId) -> Result<ResourceView, FerriteError> {
        let mut tx = self.store.begin().await?;
        let result = load_view(
            &mut tx,
            &self.ledger,
            *tenant_id.as_uuid(),
            *resource_id.as_uuid(),
        )
        .await;
        if let Err(e) = tx.rollback().await {
            debug!(error = %e, "Rollback of read transaction failed");
        }
        result
    }

    async fn persist_create(
        &self,
        tx: &mut S::Tx,
        resource_id: ResourceId,
        request: &CreateResourceRequest,
    ) -> Result<Plan, FerriteError> {
        let tenant = *request.tenant_id.as_uuid();
        let name = request.name.trim();

        self.guard.acquire(tx, &resource_id.to_string()).await?;
        self.guard
            .acquire(tx, &name_lock(tenant, request.kind, name))
            .await?;

        if tx
            .find_resource_by_name(tenant, request.kind, name)
            .await?
            .is_some()
        {
            return Err(FerriteError::conflict(format!(
                "a {} named '{name}' already exists",
                request.kind.label()
            )));
        }

        let diff = TopologyDiff::compute(
            &request.sites,
            iter::empty(),
            &request.sub_resources,
            iter::empty(),
        );
        self.validate_targets(tx, request.tenant_id, &diff).await?;
        let topology = Topology {
            sites: diff.sites.resulting(),
            sub_resources: diff.sub_resources.resulting(),
        };

        let status = if topology.sites.is_empty() {
            ResourceStatus::Synced
        } else {
            ResourceStatus::Syncing
        };
        let created_by = request.created_by.map(Uuid::from);
        let resource = tx
            .insert_resource(&NewResource {
                id: *resource_id.as_uuid(),
                tenant_id: tenant,
                kind: request.kind,
                name: name.to_string(),
                description: request.description.clone(),
                status,
                created_by,
            })
            .await?;

        let version = self.versions.bump(tx, &resource, &topology).await?;

        for sub_resource_id in &diff.sub_resources.to_create {
            tx.insert_sub_resource_association(&NewSubResourceAssociation {
                resource_id: resource.id,
                sub_resource_id: *sub_resource_id.as_uuid(),
                tenant_id: tenant,
                created_by,
            })
            .await?;
        }

        for site_id in &diff.sites.to_create {
            let association = tx
                .insert_site_association(&NewSiteAssociation {
                    resource_id: resource.id,
                    site_id: *site_id.as_uuid(),
                    status: AssociationStatus::Syncing,
                    version: Some(version.to_string()),
                })
                .await?;
            self.ledger
                .append(tx, association.id, AssociationStatus::Syncing, "sync to site requested")
                .await?;
        }

        let message = if topology.sites.is_empty() {
            format!("received {} creation request, no sites to sync", request.kind.label())
        } else {
            format!(
                "received {} creation request, syncing to {} site(s)",
                request.kind.label(),
                topology.sites.len()
            )
        };
        self.ledger.append(tx, resource.id, status, message).await?;

        let view = load_view(tx, &self.ledger, tenant, resource.id).await?;
        let requests = topology
            .sites
            .iter()
            .map(|site_id| self.sync_request(&view, *site_id))
            .collect();
        Ok(Plan { view, requests })
    }

    async fn persist_update(
        &self,
        tx: &mut S::Tx,
        request: &UpdateResourceRequest,
    ) -> Result<Plan, FerriteError> {
        let tenant = *request.tenant_id.as_uuid();
        let id = *request.resource_id.as_uuid();

        self.guard.acquire(tx, &request.resource_id.to_string()).await?;
        let resource = tx
            .find_resource(tenant, id)
            .await?
            .ok_or_else(|| FerriteError::not_found("Resource", request.resource_id))?;

        if resource.status.is_deleting() {
            return Err(FerriteError::conflict(format!(
                "{} '{}' is being deleted",
                resource.kind.label(),
                resource.name
            )));
        }
        if !request.version.matches(resource.version.as_deref()) {
            return Err(FerriteError::conflict(format!(
                "version {} does not match the current version of {} '{}'",
                request.version,
                resource.kind.label(),
                resource.name
            )));
        }

        let mut changes = ResourceChanges::default();
        if let Some(name) = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| *n != resource.name)
        {
            self.guard
                .acquire(tx, &name_lock(tenant, resource.kind, name))
                .await?;
            if tx
                .find_resource_by_name(tenant, resource.kind, name)
                .await?
                .is_some()
            {
                return Err(FerriteError::conflict(format!(
                    "a {} named '{name}' already exists",
                    resource.kind.label()
                )));
            }
            changes.name = Some(name.to_string());
        }
        if let Some(description) = request
            .description
            .as_ref()
            .filter(|d| resource.description.as_ref() != Some(*d))
        {
            changes.description = Some(description.clone());
        }

        let (live, retiring): (Vec<SiteAssociation>, Vec<SiteAssociation>) = tx
            .list_site_associations(id)
            .await?
            .into_iter()
            .partition(SiteAssociation::is_live);
        let live: BTreeMap<SiteId, SiteAssociation> = live
            .into_iter()
            .map(|a| (SiteId::from_uuid(a.site_id), a))
            .collect();
        let retiring: BTreeMap<SiteId, SiteAssociation> = retiring
            .into_iter()
            .map(|a| (SiteId::from_uuid(a.site_id), a))
            .collect();
        let sub_associations: BTreeMap<SubResourceId, SubResourceAssociation> = tx
            .list_sub_resource_associations(id)
            .await?
            .into_iter()
            .map(|a| (SubResourceId::from_uuid(a.sub_resource_id), a))
            .collect();

        let diff = TopologyDiff::compute(
            &request.sites,
            live.keys().copied(),
            &request.sub_resources,
            sub_associations.keys().copied(),
        );

        if !diff.is_changed() {
            if !changes.is_empty() {
                tx.update_resource(id, &changes).await?;
            }
            debug!(
                sites_specified = request.sites.is_specified(),
                sub_resources_specified = request.sub_resources.is_specified(),
                "Topology unchanged, version kept"
            );
            let view = load_view(tx, &self.ledger, tenant, id).await?;
            return Ok(Plan {
                view,
                requests: Vec::new(),
            });
        }

        self.validate_targets(tx, request.tenant_id, &diff).await?;
        let topology = Topology {
            sites: diff.sites.resulting(),
            sub_resources: diff.sub_resources.resulting(),
        };
        let created_by = resource.created_by;

        for sub_resource_id in &diff.sub_resources.to_delete {
            if let Some(association) = sub_associations.get(sub_resource_id) {
                tx.delete_sub_resource_association(association.id).await?;
            }
        }
        for sub_resource_id in &diff.sub_resources.to_create {
            tx.insert_sub_resource_association(&NewSubResourceAssociation {
                resource_id: id,
                sub_resource_id: *sub_resource_id.as_uuid(),
                tenant_id: tenant,
                created_by,
            })
            .await?;
        }

        let version = self.versions.bump(tx, &resource, &topology).await?;

        let mut removals: Vec<(SiteId, String)> = Vec::new();
        for site_id in &diff.sites.to_delete {
            if let Some(association) = live.get(site_id) {
                tx.set_site_association_status(association.id, AssociationStatus::Deleting)
                    .await?;
                self.ledger
                    .append(tx, association.id, AssociationStatus::Deleting, "removal from site requested")
                    .await?;
                let applied = association
                    .version
                    .clone()
                    .or_else(|| resource.version.clone())
                    .unwrap_or_default();
                removals.push((*site_id, applied));
            }
        }

        let mut to_sync: BTreeSet<SiteId> = BTreeSet::new();
        for site_id in &diff.sites.to_create {
            let association = match retiring.get(site_id) {
                Some(existing) => {
                    tx.set_site_association_status(existing.id, AssociationStatus::Syncing)
                        .await?;
                    tx.set_site_association_version(existing.id, version.as_str())
                        .await?
                }
                None => {
                    tx.insert_site_association(&NewSiteAssociation {
                        resource_id: id,
                        site_id: *site_id.as_uuid(),
                        status: AssociationStatus::Syncing,
                        version: Some(version.to_string()),
                    })
                    .await?
                }
            };
            self.ledger
                .append(tx, association.id, AssociationStatus::Syncing, "sync to site requested")
                .await?;
            to_sync.insert(*site_id);
        }

        // Kept sites carry sub-resource references, so they need the new version too.
        if diff.sub_resources.is_changed() {
            for site_id in &diff.sites.to_keep {
                if let Some(association) = live.get(site_id) {
                    tx.set_site_association_version(association.id, version.as_str())
                        .await?;
                    if association.status != AssociationStatus::Syncing {
                        tx.set_site_association_status(association.id, AssociationStatus::Syncing)
                            .await?;
                    }
                    self.ledger
                        .append(
                            tx,
                            association.id,
                            AssociationStatus::Syncing,
                            "sub-resources changed, resync requested",
                        )
                        .await?;
                    to_sync.insert(*site_id);
                }
            }
        }

        let status = if topology.sites.is_empty() {
            ResourceStatus::Synced
        } else if !to_sync.is_empty() {
            ResourceStatus::Syncing
        } else {
            resource.status
        };
        if status != resource.status {
            changes.status = Some(status);
        }
        if !changes.is_empty() {
            tx.update_resource(id, &changes).await?;
        }
        self.ledger
            .append(tx, id, status, describe_update(&diff))
            .await?;

        let view = load_view(tx, &self.ledger, tenant, id).await?;
        let mut requests: Vec<DispatchRequest> = to_sync
            .iter()
            .map(|site_id| self.sync_request(&view, *site_id))
            .collect();
        requests.extend(
            removals
                .iter()
                .map(|(site_id, applied)| self.delete_request(&view.resource, *site_id, applied)),
        );
        Ok(Plan { view, requests })
    }

    async fn persist_delete(
        &self,
        tx: &mut S::Tx,
        request: &DeleteResourceRequest,
    ) -> Result<DeletePlan, FerriteError> {
        let tenant = *request.tenant_id.as_uuid();
        let id = *request.resource_id.as_uuid();

        self.guard.acquire(tx, &request.resource_id.to_string()).await?;
        let resource = tx
            .find_resource(tenant, id)
            .await?
            .ok_or_else(|| FerriteError::not_found("Resource", request.resource_id))?;

        if let Some(version) = &request.version {
            if !version.matches(resource.version.as_deref()) {
                return Err(FerriteError::conflict(format!(
                    "version {version} does not match the current version of {} '{}'",
                    resource.kind.label(),
                    resource.name
                )));
            }
        }

        let associations = tx.list_site_associations(id).await?;
        if associations.is_empty() {
            purge_resource(tx, &resource, &[]).await?;
            return Ok(DeletePlan::Purged);
        }

        if resource.status.is_deleting() {
            debug!(pending = associations.len(), "Resource already deleting, re-dispatching removal");
        } else {
            let changes = ResourceChanges {
                status: Some(ResourceStatus::Deleting),
                ..Default::default()
            };
            tx.update_resource(id, &changes).await?;
            self.ledger
                .append(
                    tx,
                    id,
                    ResourceStatus::Deleting,
                    format!("deletion requested, removing from {} site(s)", associations.len()),
                )
                .await?;
        }

        for association in associations.iter().filter(|a| a.is_live()) {
            tx.set_site_association_status(association.id, AssociationStatus::Deleting)
                .await?;
            self.ledger
                .append(tx, association.id, AssociationStatus::Deleting, "removal from site requested")
                .await?;
        }

        let requests = associations
            .iter()
            .map(|association| {
                let applied = association
                    .version
                    .as_deref()
                    .or(resource.version.as_deref())
                    .unwrap_or_default();
                self.delete_request(&resource, SiteId::from_uuid(association.site_id), applied)
            })
            .collect();
        Ok(DeletePlan::Dispatch(requests))
    }

    /// Check that newly targeted sites exist, are registered and granted to
    /// the tenant, and that new sub-resources exist and belong to the tenant.
    async fn validate_targets(
        &self,
        tx: &mut S::Tx,
        tenant_id: TenantId,
        diff: &TopologyDiff,
    ) -> Result<(), FerriteError> {
        let tenant = *tenant_id.as_uuid();

        let site_ids: Vec<Uuid> = diff.sites.to_create.iter().map(|s| *s.as_uuid()).collect();
        if !site_ids.is_empty() {
            let sites: BTreeMap<Uuid, Site> = tx
                .find_sites(&site_ids)
                .await?
                .into_iter()
                .map(|s| (s.id, s))
                .collect();
            let accessible: BTreeSet<Uuid> = tx
                .accessible_site_ids(tenant, &site_ids)
                .await?
                .into_iter()
                .collect();

            for site_id in &site_ids {
                let site = sites.get(site_id).ok_or_else(|| {
                    FerriteError::validation("site_ids", format!("site {site_id} does not exist"))
                })?;
                if !site.is_registered() {
                    return Err(FerriteError::validation(
                        "site_ids",
                        format!("site '{}' is not registered (status {})", site.name, site.status),
                    ));
                }
                if !accessible.contains(site_id) {
                    return Err(FerriteError::validation(
                        "site_ids",
                        format!("tenant has no access to site '{}'", site.name),
                    ));
                }
            }
        }

        let sub_resource_ids: Vec<Uuid> = diff
            .sub_resources
            .to_create
            .iter()
            .map(|s| *s.as_uuid())
            .collect();
        if !sub_resource_ids.is_empty() {
            let owners: BTreeMap<Uuid, Uuid> = tx
                .find_sub_resources(&sub_resource_ids)
                .await?
                .into_iter()
                .map(|s| (s.id, s.tenant_id))
                .collect();
            for sub_resource_id in &sub_resource_ids {
                match owners.get(sub_resource_id) {
                    Some(owner) if *owner == tenant => {}
                    Some(_) => {
                        return Err(FerriteError::validation(
                            "sub_resource_ids",
                            format!("sub-resource {sub_resource_id} belongs to another tenant"),
                        ))
                    }
                    None => {
                        return Err(FerriteError::validation(
                            "sub_resource_ids",
                            format!("sub-resource {sub_resource_id} does not exist"),
                        ))
                    }
                }
            }
        }

        Ok(())
    }

    /// Remove associations whose delete workflow completed. Returns true if
    /// the resource was purged as a result. Failures are left for the next
    /// redrive and only logged.
    async fn settle_deletes(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        dispatches: &[DispatchReport],
    ) -> bool {
        let mut purged = false;
        for report in dispatches
            .iter()
            .filter(|d| d.operation == SiteOperation::Delete && d.is_success())
        {
            match self
                .confirmations
                .confirm_deleted(tenant_id, resource_id, report.site_id)
                .await
            {
                Ok(confirmation) => purged |= confirmation.resource_purged,
                Err(e) => warn!(
                    site_id = %report.site_id,
                    error = %e,
                    "Could not settle completed site removal"
                ),
            }
        }
        purged
    }

    fn sync_request(&self, view: &ResourceView, site_id: SiteId) -> DispatchRequest {
        let resource = &view.resource;
        let version = resource.version.as_deref().unwrap_or_default();
        let operation = SiteOperation::Sync;
        let sub_resource_ids: Vec<Uuid> = view
            .sub_resource_associations
            .iter()
            .map(|a| a.sub_resource_id)
            .collect();
        DispatchRequest {
            site_id,
            operation,
            workflow_name: operation.workflow_name(resource.kind),
            workflow_id: operation.workflow_id(
                resource.kind,
                ResourceId::from_uuid(resource.id),
                version,
            ),
            payload: json!({
                "resource_id": resource.id,
                "tenant_id": resource.tenant_id,
                "kind": resource.kind,
                "name": resource.name,
                "description": resource.description,
                "version": version,
                "sub_resource_ids": sub_resource_ids,
            }),
        }
    }

    fn delete_request(&self, resource: &Resource, site_id: SiteId, version: &str) -> DispatchRequest {
        let operation = SiteOperation::Delete;
        DispatchRequest {
            site_id,
            operation,
            workflow_name: operation.workflow_name(resource.kind),
            workflow_id: operation.workflow_id(
                resource.kind,
                ResourceId::from_uuid(resource.id),
                version,
            ),
            payload: json!({
                "resource_id": resource.id,
                "tenant_id": resource.tenant_id,
                "kind": resource.kind,
                "name": resource.name,
                "version": version,
            }),
        }
    }
}

fn describe_update(diff: &TopologyDiff) -> String {
    format!(
        "update requested: {} site(s) added, {} site(s) removed, {} sub-resource(s) added, {} sub-resource(s) removed",
        diff.sites.to_create.len(),
        diff.sites.to_delete.len(),
        diff.sub_resources.to_create.len(),
        diff.sub_resources.to_delete.len(),
    )
}
