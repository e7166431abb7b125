//! Workflow Engine Client Contract
//!
//! Each site runs its own workflow engine. The reconciler starts named
//! workflows on a site, waits for them with a deadline, and terminates the
//! ones that overrun it. This crate defines that contract so engine adapters
//! and test doubles can be swapped freely.
//!
//! # Modules
//!
//! - [`error`] - Closed error classification produced at the adapter boundary
//! - [`traits`] - `WorkflowClient`, `WorkflowHandle` and `SiteClientProvider`
//! - [`types`] - Start options and run references
//! - [`pool`] - In-process registry of per-site clients

pub mod error;
pub mod pool;
pub mod traits;
pub mod types;

pub use error::{WorkflowError, WorkflowResult};
pub use pool::SiteClientPool;
pub use traits::{SiteClientProvider, WorkflowClient, WorkflowHandle};
pub use types::{StartOptions, WorkflowRun};
