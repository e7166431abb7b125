//! Results of reconciler mutations.
//!
//! A mutation returns success once its transaction commits. Dispatch
//! failures after the commit are reported here instead of as errors.

use serde::Serialize;

use ferrite_core::{FerriteError, ResourceId, SiteId};

use crate::dispatcher::{DispatchReport, DispatchStatus, SiteOperation};
use crate::view::ResourceView;

/// Result of a create or update.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// Committed state, read before dispatch.
    pub view: ResourceView,
    pub dispatches: Vec<DispatchReport>,
}

/// Result of a delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub resource_id: ResourceId,
    /// True once the resource row is physically gone.
    pub purged: bool,
    pub dispatches: Vec<DispatchReport>,
}

impl ReconcileOutcome {
    /// False when any site still has work outstanding.
    #[must_use]
    pub fn is_fully_dispatched(&self) -> bool {
        self.dispatches.iter().all(DispatchReport::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = (SiteId, &FerriteError)> {
        failures(&self.dispatches)
    }

    /// Sites whose sync workflow completed. They stay `Syncing` until the
    /// site confirms the version through the confirmation path.
    #[must_use]
    pub fn synced_eligible_sites(&self) -> Vec<SiteId> {
        self.dispatches
            .iter()
            .filter(|d| d.operation == SiteOperation::Sync && d.status == DispatchStatus::Completed)
            .map(|d| d.site_id)
            .collect()
    }
}

impl DeleteOutcome {
    #[must_use]
    pub fn is_fully_dispatched(&self) -> bool {
        self.dispatches.iter().all(DispatchReport::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = (SiteId, &FerriteError)> {
        failures(&self.dispatches)
    }
}

fn failures(dispatches: &[DispatchReport]) -> impl Iterator<Item = (SiteId, &FerriteError)> {
    dispatches
        .iter()
        .filter_map(|d| d.error().map(|e| (d.site_id, e)))
}
