//! Test helpers for ferrite-sync.
//!
//! [`MemoryStore`] implements the repository traits over in-memory tables
//! with snapshot transactions and advisory locks, so the reconciler runs
//! end to end without PostgreSQL. [`MockSiteClient`] stands in for a site's
//! workflow engine and records every call it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use uuid::Uuid;

use ferrite_core::{SiteId, SubResourceId, TenantId};
use ferrite_db::{
    AdvisoryLock, AssociationStatus, CatalogRepository, DbError, NewResource, NewSiteAssociation,
    NewStatusDetail, NewSubResourceAssociation, ReconcileStore, Resource, ResourceChanges,
    ResourceKind, ResourceRepository, Site, SiteAssociation, SiteAssociationRepository,
    SiteStatus, StatusDetail, StatusDetailRepository, StoreTx, SubResource,
    SubResourceAssociation, SubResourceAssociationRepository,
};
use ferrite_sync::{ReconcilerConfig, Reconciler};
use ferrite_workflow::{
    SiteClientPool, StartOptions, WorkflowClient, WorkflowError, WorkflowHandle, WorkflowResult,
};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

/// Configuration with short deadlines and lock delays.
pub fn test_config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::default();
    config.dispatch.call_timeout_ms = 200;
    config.dispatch.terminate_timeout_ms = 200;
    config.dispatch.max_parallel = 8;
    config.lock.retries = 2;
    config.lock.base_delay_ms = 5;
    config.lock.max_jitter_ms = 5;
    config
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Every table the reconciler touches.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub resources: BTreeMap<Uuid, Resource>,
    pub site_associations: BTreeMap<Uuid, SiteAssociation>,
    pub sub_resource_associations: BTreeMap<Uuid, SubResourceAssociation>,
    /// Insertion order is chronological order.
    pub status_details: Vec<StatusDetail>,
    pub sites: BTreeMap<Uuid, Site>,
    pub tenant_sites: BTreeSet<(Uuid, Uuid)>,
    pub sub_resources: BTreeMap<Uuid, SubResource>,
}

impl Tables {
    pub fn associations_of(&self, resource_id: Uuid) -> Vec<SiteAssociation> {
        self.site_associations
            .values()
            .filter(|a| a.resource_id == resource_id)
            .cloned()
            .collect()
    }

    pub fn association(&self, resource_id: Uuid, site_id: SiteId) -> Option<SiteAssociation> {
        self.site_associations
            .values()
            .find(|a| a.resource_id == resource_id && a.site_id == *site_id.as_uuid())
            .cloned()
    }

    pub fn history_of(&self, entity_id: Uuid) -> Vec<StatusDetail> {
        self.status_details
            .iter()
            .filter(|d| d.entity_id == entity_id)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    locks: Mutex<HashSet<i64>>,
    fail_next_commit: AtomicBool,
    commits: AtomicUsize,
}

/// Store whose transactions work on a snapshot; commit merges the rows the
/// transaction wrote back into the shared tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Tables {
        self.shared.tables.lock().unwrap().clone()
    }

    pub fn add_site(&self, name: &str, status: SiteStatus) -> SiteId {
        let now = Utc::now();
        let site = Site {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status,
            created_at: now,
            updated_at: now,
        };
        let id = site.id;
        self.shared.tables.lock().unwrap().sites.insert(id, site);
        SiteId::from_uuid(id)
    }

    pub fn grant(&self, tenant_id: TenantId, site_id: SiteId) {
        self.shared
            .tables
            .lock()
            .unwrap()
            .tenant_sites
            .insert((*tenant_id.as_uuid(), *site_id.as_uuid()));
    }

    pub fn add_sub_resource(&self, tenant_id: TenantId, name: &str) -> SubResourceId {
        let sub = SubResource {
            id: Uuid::new_v4(),
            tenant_id: *tenant_id.as_uuid(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let id = sub.id;
        self.shared.tables.lock().unwrap().sub_resources.insert(id, sub);
        SubResourceId::from_uuid(id)
    }

    /// Make the next commit fail after all writes were staged.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn commit_count(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Hold an advisory lock as if another transaction owned it.
    pub fn hold_lock(&self, key: i64) {
        self.shared.locks.lock().unwrap().insert(key);
    }

    pub fn release_lock(&self, key: i64) {
        self.shared.locks.lock().unwrap().remove(&key);
    }
}

#[async_trait]
impl ReconcileStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, DbError> {
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            tables: self.snapshot(),
            writes: WriteSet::default(),
            held: Vec::new(),
        })
    }
}

/// Rows a transaction wrote, by primary key.
#[derive(Default)]
struct WriteSet {
    resources: BTreeSet<Uuid>,
    site_associations: BTreeSet<Uuid>,
    sub_resource_associations: BTreeSet<Uuid>,
    appended_details: Vec<Uuid>,
    purged_detail_entities: BTreeSet<Uuid>,
}

fn merge_rows<T: Clone>(target: &mut BTreeMap<Uuid, T>, staged: &BTreeMap<Uuid, T>, ids: &BTreeSet<Uuid>) {
    for id in ids {
        match staged.get(id) {
            Some(row) => {
                target.insert(*id, row.clone());
            }
            None => {
                target.remove(id);
            }
        }
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    tables: Tables,
    writes: WriteSet,
    held: Vec<i64>,
}

impl MemoryTx {
    /// Apply this transaction's writes on top of `target`.
    fn merge_into(&self, target: &mut Tables) {
        merge_rows(&mut target.resources, &self.tables.resources, &self.writes.resources);
        merge_rows(
            &mut target.site_associations,
            &self.tables.site_associations,
            &self.writes.site_associations,
        );
        merge_rows(
            &mut target.sub_resource_associations,
            &self.tables.sub_resource_associations,
            &self.writes.sub_resource_associations,
        );
        let purged = &self.writes.purged_detail_entities;
        target.status_details.retain(|d| !purged.contains(&d.entity_id));
        target.status_details.extend(
            self.tables
                .status_details
                .iter()
                .filter(|d| self.writes.appended_details.contains(&d.id))
                .cloned(),
        );
    }

    /// Re-read committed rows under this transaction's own writes, as a
    /// read-committed transaction does once it holds a lock.
    fn refresh(&mut self) {
        let mut fresh = self.shared.tables.lock().unwrap().clone();
        self.merge_into(&mut fresh);
        self.tables = fresh;
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.shared.locks.lock() {
            for key in self.held.drain(..) {
                locks.remove(&key);
            }
        }
    }
}

/// Apply a partial update the way the `UPDATE ... COALESCE` query does.
fn apply_changes(changes: &ResourceChanges, resource: &mut Resource) {
    if let Some(name) = &changes.name {
        resource.name.clone_from(name);
    }
    if let Some(description) = &changes.description {
        resource.description = Some(description.clone());
    }
    if let Some(status) = changes.status {
        resource.status = status;
    }
    if let Some(version) = &changes.version {
        resource.version = Some(version.clone());
    }
    resource.updated_at = Utc::now();
}

fn missing(what: &str, id: Uuid) -> DbError {
    DbError::NotFound(format!("{what} {id}"))
}

#[async_trait]
impl AdvisoryLock for MemoryTx {
    async fn try_advisory_xact_lock(&mut self, key: i64) -> Result<bool, DbError> {
        if self.held.contains(&key) {
            return Ok(true);
        }
        let acquired = self.shared.locks.lock().unwrap().insert(key);
        if acquired {
            self.held.push(key);
            self.refresh();
        }
        Ok(acquired)
    }
}

#[async_trait]
impl ResourceRepository for MemoryTx {
    async fn find_resource(&mut self, tenant_id: Uuid, id: Uuid) -> Result<Option<Resource>, DbError> {
        Ok(self
            .tables
            .resources
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_resource_by_name(
        &mut self,
        tenant_id: Uuid,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<Resource>, DbError> {
        Ok(self
            .tables
            .resources
            .values()
            .find(|r| r.tenant_id == tenant_id && r.kind == kind && r.name == name)
            .cloned())
    }

    async fn insert_resource(&mut self, input: &NewResource) -> Result<Resource, DbError> {
        let now = Utc::now();
        let resource = Resource {
            id: input.id,
            tenant_id: input.tenant_id,
            kind: input.kind,
            name: input.name.clone(),
            description: input.description.clone(),
            status: input.status,
            version: None,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        self.tables.resources.insert(resource.id, resource.clone());
        self.writes.resources.insert(resource.id);
        Ok(resource)
    }

    async fn update_resource(&mut self, id: Uuid, changes: &ResourceChanges) -> Result<Resource, DbError> {
        let resource = self
            .tables
            .resources
            .get_mut(&id)
            .ok_or_else(|| missing("resource", id))?;
        apply_changes(changes, resource);
        self.writes.resources.insert(id);
        Ok(resource.clone())
    }

    async fn delete_resource(&mut self, id: Uuid) -> Result<bool, DbError> {
        let removed = self.tables.resources.remove(&id).is_some();
        self.writes.resources.insert(id);
        let tables = &mut self.tables;
        let writes = &mut self.writes;
        tables.site_associations.retain(|row_id, a| {
            let keep = a.resource_id != id;
            if !keep {
                writes.site_associations.insert(*row_id);
            }
            keep
        });
        tables.sub_resource_associations.retain(|row_id, a| {
            let keep = a.resource_id != id;
            if !keep {
                writes.sub_resource_associations.insert(*row_id);
            }
            keep
        });
        Ok(removed)
    }
}

#[async_trait]
impl SiteAssociationRepository for MemoryTx {
    async fn list_site_associations(&mut self, resource_id: Uuid) -> Result<Vec<SiteAssociation>, DbError> {
        Ok(self.tables.associations_of(resource_id))
    }

    async fn insert_site_association(
        &mut self,
        input: &NewSiteAssociation,
    ) -> Result<SiteAssociation, DbError> {
        let now = Utc::now();
        let association = SiteAssociation {
            id: Uuid::new_v4(),
            resource_id: input.resource_id,
            site_id: input.site_id,
            status: input.status,
            version: input.version.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables
            .site_associations
            .insert(association.id, association.clone());
        self.writes.site_associations.insert(association.id);
        Ok(association)
    }

    async fn set_site_association_status(
        &mut self,
        id: Uuid,
        status: AssociationStatus,
    ) -> Result<SiteAssociation, DbError> {
        let association = self
            .tables
            .site_associations
            .get_mut(&id)
            .ok_or_else(|| missing("site association", id))?;
        association.status = status;
        association.updated_at = Utc::now();
        self.writes.site_associations.insert(id);
        Ok(association.clone())
    }

    async fn set_site_association_version(
        &mut self,
        id: Uuid,
        version: &str,
    ) -> Result<SiteAssociation, DbError> {
        let association = self
            .tables
            .site_associations
            .get_mut(&id)
            .ok_or_else(|| missing("site association", id))?;
        association.version = Some(version.to_string());
        association.updated_at = Utc::now();
        self.writes.site_associations.insert(id);
        Ok(association.clone())
    }

    async fn delete_site_association(&mut self, id: Uuid) -> Result<bool, DbError> {
        self.writes.site_associations.insert(id);
        Ok(self.tables.site_associations.remove(&id).is_some())
    }
}

#[async_trait]
impl SubResourceAssociationRepository for MemoryTx {
    async fn list_sub_resource_associations(
        &mut self,
        resource_id: Uuid,
    ) -> Result<Vec<SubResourceAssociation>, DbError> {
        Ok(self
            .tables
            .sub_resource_associations
            .values()
            .filter(|a| a.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn insert_sub_resource_association(
        &mut self,
        input: &NewSubResourceAssociation,
    ) -> Result<SubResourceAssociation, DbError> {
        let association = SubResourceAssociation {
            id: Uuid::new_v4(),
            resource_id: input.resource_id,
            sub_resource_id: input.sub_resource_id,
            tenant_id: input.tenant_id,
            created_by: input.created_by,
            created_at: Utc::now(),
        };
        self.tables
            .sub_resource_associations
            .insert(association.id, association.clone());
        self.writes.sub_resource_associations.insert(association.id);
        Ok(association)
    }

    async fn delete_sub_resource_association(&mut self, id: Uuid) -> Result<bool, DbError> {
        self.writes.sub_resource_associations.insert(id);
        Ok(self.tables.sub_resource_associations.remove(&id).is_some())
    }

    async fn delete_sub_resource_associations_for(&mut self, resource_id: Uuid) -> Result<u64, DbError> {
        let removed: Vec<Uuid> = self
            .tables
            .sub_resource_associations
            .values()
            .filter(|a| a.resource_id == resource_id)
            .map(|a| a.id)
            .collect();
        for id in &removed {
            self.tables.sub_resource_associations.remove(id);
            self.writes.sub_resource_associations.insert(*id);
        }
        Ok(removed.len() as u64)
    }
}

#[async_trait]
impl StatusDetailRepository for MemoryTx {
    async fn append_status_detail(&mut self, input: &NewStatusDetail) -> Result<StatusDetail, DbError> {
        let detail = StatusDetail {
            id: Uuid::new_v4(),
            entity_id: input.entity_id,
            status: input.status.clone(),
            message: input.message.clone(),
            created_at: Utc::now(),
        };
        self.tables.status_details.push(detail.clone());
        self.writes.appended_details.push(detail.id);
        Ok(detail)
    }

    async fn recent_status_details(
        &mut self,
        entity_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<StatusDetail>, DbError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut taken: BTreeMap<Uuid, usize> = BTreeMap::new();
        let mut recent = Vec::new();
        for detail in self.tables.status_details.iter().rev() {
            if !entity_ids.contains(&detail.entity_id) {
                continue;
            }
            let count = taken.entry(detail.entity_id).or_default();
            if *count < limit {
                *count += 1;
                recent.push(detail.clone());
            }
        }
        Ok(recent)
    }

    async fn delete_status_details_for(&mut self, entity_ids: &[Uuid]) -> Result<u64, DbError> {
        let before = self.tables.status_details.len();
        self.tables
            .status_details
            .retain(|d| !entity_ids.contains(&d.entity_id));
        self.writes
            .purged_detail_entities
            .extend(entity_ids.iter().copied());
        Ok((before - self.tables.status_details.len()) as u64)
    }
}

#[async_trait]
impl CatalogRepository for MemoryTx {
    async fn find_sites(&mut self, ids: &[Uuid]) -> Result<Vec<Site>, DbError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.sites.get(id).cloned())
            .collect())
    }

    async fn accessible_site_ids(&mut self, tenant_id: Uuid, site_ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        Ok(site_ids
            .iter()
            .filter(|site_id| self.tables.tenant_sites.contains(&(tenant_id, **site_id)))
            .copied()
            .collect())
    }

    async fn find_sub_resources(&mut self, ids: &[Uuid]) -> Result<Vec<SubResource>, DbError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.tables.sub_resources.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self) -> Result<(), DbError> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DbError::TransactionFailed(sqlx::Error::PoolClosed));
        }
        {
            let mut tables = self.shared.tables.lock().unwrap();
            self.merge_into(&mut tables);
        }
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), DbError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock site workflow engine
// ---------------------------------------------------------------------------

/// How a mock site answers workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteBehavior {
    Succeed,
    ObjectNotFound,
    Deny,
    Unimplemented,
    Fail,
    /// The engine reports its own timeout.
    EngineTimeout,
    /// The workflow never finishes.
    Hang,
    /// The workflow never finishes and terminate calls fail.
    HangRejectTerminate,
    /// Starting the workflow never returns.
    HangOnStart,
}

/// A workflow start recorded by [`MockSiteClient`].
#[derive(Debug, Clone)]
pub struct StartedWorkflow {
    pub id: String,
    pub name: String,
    pub task_queue: String,
    pub payload: Value,
}

#[derive(Default)]
struct ClientState {
    starts: Mutex<Vec<StartedWorkflow>>,
    terminations: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct MockSiteClient {
    behavior: Mutex<SiteBehavior>,
    delay: Duration,
    state: Arc<ClientState>,
}

impl MockSiteClient {
    pub fn new(behavior: SiteBehavior) -> Self {
        Self::with_delay(behavior, Duration::ZERO)
    }

    /// Successful workflows take `delay` to complete.
    pub fn with_delay(behavior: SiteBehavior, delay: Duration) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay,
            state: Arc::new(ClientState::default()),
        }
    }

    pub fn set_behavior(&self, behavior: SiteBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn starts(&self) -> Vec<StartedWorkflow> {
        self.state.starts.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> Vec<String> {
        self.state.terminations.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    fn behavior(&self) -> SiteBehavior {
        *self.behavior.lock().unwrap()
    }
}

struct MockHandle {
    id: String,
    behavior: SiteBehavior,
    delay: Duration,
    state: Arc<ClientState>,
}

#[async_trait]
impl WorkflowHandle for MockHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn run_id(&self) -> Option<&str> {
        Some("run-1")
    }

    async fn get(&self) -> WorkflowResult<Value> {
        let message = format!("workflow {}", self.id);
        let result = match self.behavior {
            SiteBehavior::Succeed => {
                tokio::time::sleep(self.delay).await;
                Ok(json!({ "status": "ok" }))
            }
            SiteBehavior::ObjectNotFound => Err(WorkflowError::ObjectNotFound { message }),
            SiteBehavior::Deny => Err(WorkflowError::Denied { message }),
            SiteBehavior::Unimplemented => Err(WorkflowError::Unimplemented { message }),
            SiteBehavior::Fail => Err(WorkflowError::Failed { message }),
            SiteBehavior::EngineTimeout => Err(WorkflowError::Timeout { message }),
            SiteBehavior::Hang
            | SiteBehavior::HangRejectTerminate
            | SiteBehavior::HangOnStart => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
        };
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl WorkflowClient for MockSiteClient {
    async fn execute_workflow(
        &self,
        options: StartOptions,
        workflow_name: &str,
        payload: Value,
    ) -> WorkflowResult<Box<dyn WorkflowHandle>> {
        let behavior = self.behavior();
        self.state.starts.lock().unwrap().push(StartedWorkflow {
            id: options.id.clone(),
            name: workflow_name.to_string(),
            task_queue: options.task_queue.clone(),
            payload,
        });
        if behavior == SiteBehavior::HangOnStart {
            std::future::pending::<()>().await;
        }

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(MockHandle {
            id: options.id,
            behavior,
            delay: self.delay,
            state: Arc::clone(&self.state),
        }))
    }

    async fn terminate_workflow(
        &self,
        workflow_id: &str,
        _run_id: Option<&str>,
        _reason: &str,
    ) -> WorkflowResult<()> {
        self.state
            .terminations
            .lock()
            .unwrap()
            .push(workflow_id.to_string());
        if self.behavior() == SiteBehavior::HangRejectTerminate {
            return Err(WorkflowError::Failed {
                message: "terminate rejected".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Reconciler wired to a memory store and mock sites for one tenant.
pub struct Harness {
    pub store: MemoryStore,
    pub pool: SiteClientPool,
    pub reconciler: Reconciler<MemoryStore>,
    pub tenant_id: TenantId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        init_test_logging();
        let store = MemoryStore::new();
        let pool = SiteClientPool::new();
        let reconciler =
            Reconciler::new(Arc::new(store.clone()), Arc::new(pool.clone())).with_config(config);
        Self {
            store,
            pool,
            reconciler,
            tenant_id: TenantId::new(),
        }
    }

    /// A registered site granted to the tenant, served by a mock client.
    pub async fn site(&self, name: &str, behavior: SiteBehavior) -> (SiteId, Arc<MockSiteClient>) {
        let site_id = self.store.add_site(name, SiteStatus::Registered);
        self.store.grant(self.tenant_id, site_id);
        let client = Arc::new(MockSiteClient::new(behavior));
        self.pool.register(site_id, client.clone()).await;
        (site_id, client)
    }

    pub fn sub_resource(&self, name: &str) -> SubResourceId {
        self.store.add_sub_resource(self.tenant_id, name)
    }
}
