//! Database models.

pub mod resource;
pub mod site;
pub mod site_association;
pub mod status_detail;
pub mod sub_resource;
pub mod sub_resource_association;

pub use resource::{NewResource, Resource, ResourceChanges, ResourceKind, ResourceStatus};
pub use site::{Site, SiteStatus, TenantSite};
pub use site_association::{AssociationStatus, NewSiteAssociation, SiteAssociation};
pub use status_detail::{NewStatusDetail, StatusDetail};
pub use sub_resource::SubResource;
pub use sub_resource_association::{NewSubResourceAssociation, SubResourceAssociation};
