//! Association diff engine.
//!
//! Pure set arithmetic between the desired topology of a request and the
//! associations currently stored. No store access, no side effects.

use ferrite_core::{DesiredSet, SiteId, SubResourceId};
use std::collections::BTreeSet;

/// Create/keep/delete partition for one association kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationDiff<K: Ord> {
    pub to_create: BTreeSet<K>,
    pub to_keep: BTreeSet<K>,
    pub to_delete: BTreeSet<K>,
}

impl<K: Ord + Copy> AssociationDiff<K> {
    /// Diff `desired` against the stored targets.
    ///
    /// `Unspecified` keeps everything stored; `Clear` deletes everything.
    pub fn compute(desired: &DesiredSet<K>, stored: impl IntoIterator<Item = K>) -> Self {
        let stored: BTreeSet<K> = stored.into_iter().collect();
        match desired.targets() {
            None => Self {
                to_create: BTreeSet::new(),
                to_keep: stored,
                to_delete: BTreeSet::new(),
            },
            Some(wanted) => {
                let wanted: BTreeSet<K> = wanted.into_iter().copied().collect();
                Self {
                    to_create: wanted.difference(&stored).copied().collect(),
                    to_keep: wanted.intersection(&stored).copied().collect(),
                    to_delete: stored.difference(&wanted).copied().collect(),
                }
            }
        }
    }

    /// Check if applying the diff changes anything.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !self.to_create.is_empty() || !self.to_delete.is_empty()
    }

    /// Targets associated once the diff is applied.
    #[must_use]
    pub fn resulting(&self) -> BTreeSet<K> {
        self.to_keep.union(&self.to_create).copied().collect()
    }
}

/// Diffs for both association kinds of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDiff {
    pub sites: AssociationDiff<SiteId>,
    pub sub_resources: AssociationDiff<SubResourceId>,
}

impl TopologyDiff {
    pub fn compute(
        desired_sites: &DesiredSet<SiteId>,
        stored_sites: impl IntoIterator<Item = SiteId>,
        desired_sub_resources: &DesiredSet<SubResourceId>,
        stored_sub_resources: impl IntoIterator<Item = SubResourceId>,
    ) -> Self {
        Self {
            sites: AssociationDiff::compute(desired_sites, stored_sites),
            sub_resources: AssociationDiff::compute(desired_sub_resources, stored_sub_resources),
        }
    }

    /// A topology change is what triggers a version bump.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.sites.is_changed() || self.sub_resources.is_changed()
    }
}
