//! ferrite Database Layer
//!
//! PostgreSQL persistence for site reconciliation.
//!
//! # Modules
//!
//! - [`models`] - Row types with `PgExecutor`-generic query functions
//! - [`repository`] - Transaction-scoped repository traits consumed by the reconciler
//! - [`store`] - PostgreSQL implementation of those traits
//! - [`pool`] - Connection pool wrapper
//! - [`migrations`] - Embedded schema migrations

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use migrations::run_migrations;
pub use models::{
    AssociationStatus, NewResource, NewSiteAssociation, NewStatusDetail,
    NewSubResourceAssociation, Resource, ResourceChanges, ResourceKind, ResourceStatus, Site,
    SiteAssociation, SiteStatus, StatusDetail, SubResource, SubResourceAssociation, TenantSite,
};
pub use pool::DbPool;
pub use repository::{
    AdvisoryLock, CatalogRepository, ReconcileStore, ResourceRepository,
    SiteAssociationRepository, StatusDetailRepository, StoreTx, SubResourceAssociationRepository,
};
pub use store::{PgStore, PgStoreTx};
