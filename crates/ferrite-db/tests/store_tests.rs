//! PostgreSQL store integration tests.
//!
//! Run with `cargo test -p ferrite-db --features integration` against a
//! database reachable through `DATABASE_URL`.

#![cfg(feature = "integration")]

mod common;

use common::TestContext;
use ferrite_db::{
    AdvisoryLock, AssociationStatus, CatalogRepository, NewSiteAssociation, NewStatusDetail,
    NewSubResourceAssociation, ReconcileStore, ResourceChanges, ResourceRepository,
    SiteAssociationRepository, StatusDetailRepository, StoreTx, SubResourceAssociationRepository,
};
use uuid::Uuid;

#[tokio::test]
async fn test_advisory_lock_is_exclusive_until_commit() {
    let ctx = TestContext::new().await;
    let key = i64::from(rand_key());

    let mut first = ctx.store.begin().await.unwrap();
    let mut second = ctx.store.begin().await.unwrap();

    assert!(first.try_advisory_xact_lock(key).await.unwrap());
    assert!(!second.try_advisory_xact_lock(key).await.unwrap());

    first.commit().await.unwrap();
    assert!(second.try_advisory_xact_lock(key).await.unwrap());
    second.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rollback_discards_resource_changes() {
    let ctx = TestContext::new().await;
    let resource = ctx.create_resource(&TestContext::unique_name("rollback")).await;

    let mut tx = ctx.store.begin().await.unwrap();
    let changes = ResourceChanges {
        version: Some("abc".into()),
        ..Default::default()
    };
    let updated = tx.update_resource(resource.id, &changes).await.unwrap();
    assert_eq!(updated.version.as_deref(), Some("abc"));
    tx.rollback().await.unwrap();

    let mut tx = ctx.store.begin().await.unwrap();
    let reloaded = tx
        .find_resource(ctx.tenant_id, resource.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.version, None);
}

#[tokio::test]
async fn test_find_by_name_is_tenant_scoped() {
    let ctx = TestContext::new().await;
    let name = TestContext::unique_name("scoped");
    let resource = ctx.create_resource(&name).await;

    let mut tx = ctx.store.begin().await.unwrap();
    let found = tx
        .find_resource_by_name(ctx.tenant_id, resource.kind, &name)
        .await
        .unwrap();
    assert_eq!(found.map(|r| r.id), Some(resource.id));

    let other_tenant = tx
        .find_resource_by_name(Uuid::new_v4(), resource.kind, &name)
        .await
        .unwrap();
    assert!(other_tenant.is_none());
}

#[tokio::test]
async fn test_site_associations_and_catalog() {
    let ctx = TestContext::new().await;
    let site = ctx.create_site("site-a").await;
    let resource = ctx.create_resource(&TestContext::unique_name("assoc")).await;

    let mut tx = ctx.store.begin().await.unwrap();
    let accessible = tx
        .accessible_site_ids(ctx.tenant_id, &[site.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(accessible, vec![site.id]);

    let assoc = tx
        .insert_site_association(&NewSiteAssociation {
            resource_id: resource.id,
            site_id: site.id,
            status: AssociationStatus::Syncing,
            version: Some("v1".into()),
        })
        .await
        .unwrap();
    let deleting = tx
        .set_site_association_status(assoc.id, AssociationStatus::Deleting)
        .await
        .unwrap();
    assert_eq!(deleting.status, AssociationStatus::Deleting);

    let listed = tx.list_site_associations(resource.id).await.unwrap();
    assert_eq!(listed.len(), 1);

    assert!(tx.delete_site_association(assoc.id).await.unwrap());
    assert!(tx.list_site_associations(resource.id).await.unwrap().is_empty());
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_sub_resource_associations_cascade_delete() {
    let ctx = TestContext::new().await;
    let key = ctx.create_sub_resource("ops-key").await;
    let resource = ctx.create_resource(&TestContext::unique_name("subs")).await;

    let mut tx = ctx.store.begin().await.unwrap();
    tx.insert_sub_resource_association(&NewSubResourceAssociation {
        resource_id: resource.id,
        sub_resource_id: key.id,
        tenant_id: ctx.tenant_id,
        created_by: None,
    })
    .await
    .unwrap();
    assert_eq!(tx.list_sub_resource_associations(resource.id).await.unwrap().len(), 1);
    assert_eq!(
        tx.delete_sub_resource_associations_for(resource.id).await.unwrap(),
        1
    );
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_recent_status_details_newest_first_with_limit() {
    let ctx = TestContext::new().await;
    let entity = Uuid::new_v4();
    let other = Uuid::new_v4();

    let mut tx = ctx.store.begin().await.unwrap();
    for status in ["syncing", "synced", "deleting"] {
        tx.append_status_detail(&NewStatusDetail {
            entity_id: entity,
            status: status.to_string(),
            message: Some(format!("now {status}")),
        })
        .await
        .unwrap();
    }
    tx.append_status_detail(&NewStatusDetail {
        entity_id: other,
        status: "syncing".into(),
        message: None,
    })
    .await
    .unwrap();

    let recent = tx.recent_status_details(&[entity, other], 2).await.unwrap();
    let for_entity: Vec<_> = recent
        .iter()
        .filter(|d| d.entity_id == entity)
        .map(|d| d.status.as_str())
        .collect();
    assert_eq!(for_entity, vec!["deleting", "synced"]);
    assert_eq!(recent.iter().filter(|d| d.entity_id == other).count(), 1);

    assert_eq!(tx.delete_status_details_for(&[entity]).await.unwrap(), 3);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_find_sites_ignores_unknown_ids() {
    let ctx = TestContext::new().await;
    let site = ctx.create_site("site-b").await;

    let mut tx = ctx.store.begin().await.unwrap();
    let sites = tx.find_sites(&[site.id, Uuid::new_v4()]).await.unwrap();
    assert_eq!(sites.len(), 1);
    assert!(sites[0].is_registered());
}

fn rand_key() -> i32 {
    (Uuid::new_v4().as_u128() & 0x7fff_ffff) as i32
}
