//! Site client pool.
//!
//! Holds one workflow client per site. Site clients are registered when a
//! site comes online and removed when it is decommissioned.

use async_trait::async_trait;
use ferrite_core::SiteId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{WorkflowError, WorkflowResult};
use crate::traits::{SiteClientProvider, WorkflowClient};

/// Registry of per-site workflow clients.
#[derive(Default, Clone)]
pub struct SiteClientPool {
    clients: Arc<RwLock<HashMap<SiteId, Arc<dyn WorkflowClient>>>>,
}

impl SiteClientPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the client for a site.
    pub async fn register(&self, site_id: SiteId, client: Arc<dyn WorkflowClient>) {
        let replaced = self.clients.write().await.insert(site_id, client).is_some();
        info!(site_id = %site_id, replaced, "Registered site workflow client");
    }

    /// Remove the client for a site. Returns true if one was registered.
    pub async fn remove(&self, site_id: SiteId) -> bool {
        let removed = self.clients.write().await.remove(&site_id).is_some();
        if removed {
            info!(site_id = %site_id, "Removed site workflow client");
        }
        removed
    }

    /// Number of registered sites.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Returns true if no site has a client.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

#[async_trait]
impl SiteClientProvider for SiteClientPool {
    async fn client_for_site(&self, site_id: SiteId) -> WorkflowResult<Arc<dyn WorkflowClient>> {
        let clients = self.clients.read().await;
        match clients.get(&site_id) {
            Some(client) => Ok(Arc::clone(client)),
            None => {
                debug!(site_id = %site_id, "No workflow client registered for site");
                Err(WorkflowError::ClientUnavailable {
                    site_id,
                    message: "site has no registered workflow client".to_string(),
                })
            }
        }
    }
}
