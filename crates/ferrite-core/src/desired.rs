//! Three-state desired topology.
//!
//! A request field that lists associated IDs can be absent (leave the
//! associations alone), present but empty (remove all of them) or present
//! with IDs (make the stored associations match exactly).
//!
//! On the wire an absent or `null` field is `Unspecified` and `[]` is `Clear`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Desired state of one association kind in a mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "Option<Vec<T>>",
    into = "Option<Vec<T>>",
    bound(
        serialize = "T: Ord + Clone + Serialize",
        deserialize = "T: Ord + Deserialize<'de>"
    )
)]
pub enum DesiredSet<T: Ord> {
    /// Field omitted: stored associations are left untouched.
    Unspecified,
    /// Explicitly empty: every stored association is removed.
    Clear,
    /// Exactly these targets must be associated.
    Set(BTreeSet<T>),
}

impl<T: Ord> DesiredSet<T> {
    /// Builds a desired set from explicit IDs. An empty iterator yields `Clear`.
    pub fn of(ids: impl IntoIterator<Item = T>) -> Self {
        let set: BTreeSet<T> = ids.into_iter().collect();
        if set.is_empty() {
            Self::Clear
        } else {
            Self::Set(set)
        }
    }

    /// Returns true unless the field was omitted.
    #[must_use]
    pub fn is_specified(&self) -> bool {
        !matches!(self, Self::Unspecified)
    }

    /// The targets the caller wants, or `None` when the field was omitted.
    #[must_use]
    pub fn targets(&self) -> Option<BTreeSet<&T>> {
        match self {
            Self::Unspecified => None,
            Self::Clear => Some(BTreeSet::new()),
            Self::Set(ids) => Some(ids.iter().collect()),
        }
    }
}

impl<T: Ord> Default for DesiredSet<T> {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl<T: Ord> From<Option<Vec<T>>> for DesiredSet<T> {
    fn from(value: Option<Vec<T>>) -> Self {
        match value {
            None => Self::Unspecified,
            Some(ids) => Self::of(ids),
        }
    }
}

impl<T: Ord> From<DesiredSet<T>> for Option<Vec<T>> {
    fn from(value: DesiredSet<T>) -> Self {
        match value {
            DesiredSet::Unspecified => None,
            DesiredSet::Clear => Some(Vec::new()),
            DesiredSet::Set(ids) => Some(ids.into_iter().collect()),
        }
    }
}
