//! Resource read model returned by every reconciler operation.

use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use ferrite_core::{FerriteError, ResourceId, SiteId, VersionToken};
use ferrite_db::{Resource, SiteAssociation, StatusDetail, StoreTx, SubResourceAssociation};

use crate::ledger::StatusLedger;

/// A site association joined with its site name and recent history.
#[derive(Debug, Clone, Serialize)]
pub struct SiteAssociationView {
    #[serde(flatten)]
    pub association: SiteAssociation,
    pub site_name: Option<String>,
    pub status_history: Vec<StatusDetail>,
}

/// A resource with its associations and recent status history.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceView {
    pub resource: Resource,
    pub site_associations: Vec<SiteAssociationView>,
    pub sub_resource_associations: Vec<SubResourceAssociation>,
    pub status_history: Vec<StatusDetail>,
}

impl ResourceView {
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::from_uuid(self.resource.id)
    }

    /// Current version token, if one has been allocated.
    #[must_use]
    pub fn version(&self) -> Option<VersionToken> {
        self.resource.version.clone().map(VersionToken::from)
    }

    #[must_use]
    pub fn association_for(&self, site_id: SiteId) -> Option<&SiteAssociationView> {
        self.site_associations
            .iter()
            .find(|a| a.association.site_id == *site_id.as_uuid())
    }
}

/// Load the view of a resource inside an open transaction.
pub(crate) async fn load_view<T>(
    tx: &mut T,
    ledger: &StatusLedger,
    tenant_id: Uuid,
    resource_id: Uuid,
) -> Result<ResourceView, FerriteError>
where
    T: StoreTx,
{
    let resource = tx
        .find_resource(tenant_id, resource_id)
        .await?
        .ok_or_else(|| FerriteError::not_found("Resource", resource_id))?;

    let associations = tx.list_site_associations(resource_id).await?;
    let sub_resource_associations = tx.list_sub_resource_associations(resource_id).await?;

    let site_ids: Vec<Uuid> = associations.iter().map(|a| a.site_id).collect();
    let site_names: BTreeMap<Uuid, String> = if site_ids.is_empty() {
        BTreeMap::new()
    } else {
        tx.find_sites(&site_ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect()
    };

    let mut entity_ids = vec![resource_id];
    entity_ids.extend(associations.iter().map(|a| a.id));
    let mut history = ledger.recent_for(tx, &entity_ids).await?;

    let site_associations = associations
        .into_iter()
        .map(|association| SiteAssociationView {
            site_name: site_names.get(&association.site_id).cloned(),
            status_history: history.remove(&association.id).unwrap_or_default(),
            association,
        })
        .collect();

    Ok(ResourceView {
        status_history: history.remove(&resource_id).unwrap_or_default(),
        resource,
        site_associations,
        sub_resource_associations,
    })
}
