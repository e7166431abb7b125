//! Version allocator.
//!
//! Tokens are a SHA-256 chain over the previous token and the resulting
//! topology, so every topology write yields a token distinct from all the
//! resource's earlier ones, including a return to an older topology.

use ferrite_core::{ResourceId, SiteId, SubResourceId, VersionToken};
use ferrite_db::{DbError, Resource, ResourceChanges, ResourceRepository};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::debug;

/// The live topology of a resource after a diff is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub sites: BTreeSet<SiteId>,
    pub sub_resources: BTreeSet<SubResourceId>,
}

/// Allocates version tokens for topology writes.
#[derive(Debug, Clone, Default)]
pub struct VersionAllocator;

impl VersionAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Derive the token that follows `previous` for the given topology.
    #[must_use]
    pub fn derive(
        &self,
        previous: Option<&str>,
        resource_id: ResourceId,
        topology: &Topology,
    ) -> VersionToken {
        let mut hasher = Sha256::new();
        hasher.update(previous.unwrap_or_default().as_bytes());
        hasher.update(b":");
        hasher.update(resource_id.to_string().as_bytes());
        for site in &topology.sites {
            hasher.update(b":s");
            hasher.update(site.as_uuid().as_bytes());
        }
        for sub in &topology.sub_resources {
            hasher.update(b":k");
            hasher.update(sub.as_uuid().as_bytes());
        }
        VersionToken::new(hex::encode(hasher.finalize()))
    }

    /// Allocate and persist a new version for `resource` inside the caller's
    /// transaction. The caller must hold the resource's concurrency guard.
    pub async fn bump<R>(
        &self,
        tx: &mut R,
        resource: &Resource,
        topology: &Topology,
    ) -> Result<VersionToken, DbError>
    where
        R: ResourceRepository + ?Sized,
    {
        let token = self.derive(
            resource.version.as_deref(),
            ResourceId::from_uuid(resource.id),
            topology,
        );
        let changes = ResourceChanges {
            version: Some(token.as_str().to_string()),
            ..Default::default()
        };
        tx.update_resource(resource.id, &changes).await?;
        debug!(resource_id = %resource.id, version = %token, "Allocated resource version");
        Ok(token)
    }
}
