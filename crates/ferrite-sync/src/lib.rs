//! ferrite Site Reconciliation
//!
//! Keeps tenant resources replicated to the sites they are associated with.
//! A mutation diffs the desired site and sub-resource topology against what
//! is stored, commits the new associations and version in one transaction,
//! then dispatches one remote workflow per affected site.
//!
//! # Modules
//!
//! - [`reconciler`] - Create, update, delete and read entry points
//! - [`confirmation`] - Site reports that settle associations
//! - [`diff`] - Desired versus stored association diff
//! - [`dispatcher`] - Bounded parallel workflow fan-out with deadlines
//! - [`guard`] - Advisory lock acquisition with retry
//! - [`version`] - Version token allocation
//! - [`ledger`] - Status history
//! - [`config`] - Configuration from environment
//! - [`logging`] - Structured logging setup

pub mod config;
pub mod confirmation;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod logging;
pub mod outcome;
pub mod reconciler;
pub mod request;
mod transaction;
pub mod version;
pub mod view;

pub use config::{ConfigError, DispatchConfig, LockConfig, ReconcilerConfig, NAME_COLUMN_LENGTH};
pub use confirmation::{rollup_status, ConfirmationService, DeletionConfirmation};
pub use diff::{AssociationDiff, TopologyDiff};
pub use dispatcher::{DispatchReport, DispatchRequest, DispatchStatus, SiteDispatcher, SiteOperation};
pub use error::GuardError;
pub use guard::ConcurrencyGuard;
pub use ledger::StatusLedger;
pub use logging::{init_logging, LoggingError};
pub use outcome::{DeleteOutcome, ReconcileOutcome};
pub use reconciler::Reconciler;
pub use request::{CreateResourceRequest, DeleteResourceRequest, UpdateResourceRequest};
pub use version::{Topology, VersionAllocator};
pub use view::{ResourceView, SiteAssociationView};
