mod common;

use std::sync::Arc;

use serde_json::json;

use common::{doc_model, fields};
use omnistore_core::StorageError;
use omnistore_crud::{SyncStrategy, UnifiedCrud};
use omnistore_dao::{Dao, MemoryDao};
use omnistore_model::security::{check_permission, Permission, SecurityContext};
use omnistore_model::storage::{ModelDescriptor, StorageBinding, StorageKind};

fn secured_engine() -> (UnifiedCrud, Arc<MemoryDao>) {
    let model = doc_model(true, &["primary", "cache"]);
    let primary = Arc::new(MemoryDao::new(Arc::clone(&model)));
    let cache = Arc::new(MemoryDao::new(Arc::clone(&model)));
    let engine = UnifiedCrud::from_daos(
        model,
        vec![
            ("primary".into(), primary.clone() as Arc<dyn Dao>),
            ("cache".into(), cache as Arc<dyn Dao>),
        ],
    )
    .with_strategy(SyncStrategy::PrimaryFirst);
    (engine, primary)
}

#[tokio::test]
async fn create_requires_a_context_for_secured_models() {
    let (engine, _) = secured_engine();
    let err = engine
        .create(fields(&[("title", json!("T"))]), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Permission(_)));
}

#[tokio::test]
async fn create_stamps_owner_audit_and_admin_acl() {
    let (engine, _) = secured_engine();
    let ctx = SecurityContext::new("u1");
    let created = engine
        .create(fields(&[("title", json!("T"))]), Some(&ctx), None)
        .await
        .unwrap();

    let security = created.security.as_ref().unwrap();
    assert_eq!(security.owner_id.as_deref(), Some("u1"));
    assert_eq!(security.created_by.as_deref(), Some("u1"));
    assert_eq!(security.modified_by.as_deref(), Some("u1"));
    assert_eq!(security.acl.len(), 1);
    assert_eq!(security.acl[0].principal_id, "u1");
    assert!(security.acl[0].has_permission(Permission::Admin));

    // The owner holds every permission.
    for permission in [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::Admin,
    ] {
        assert!(check_permission(&created, &ctx, permission));
    }
}

#[tokio::test]
async fn update_by_stranger_is_denied_and_leaves_data_intact() {
    let (engine, primary) = secured_engine();
    let owner = SecurityContext::new("u1");
    let created = engine
        .create(fields(&[("title", json!("T"))]), Some(&owner), None)
        .await
        .unwrap();

    let stranger = SecurityContext::new("u2").with_roles(vec!["member".into()]);
    let err = engine
        .update(
            &created.id,
            fields(&[("title", json!("X"))]),
            Some(&stranger),
            None,
        )
        .await
        .unwrap_err();
    match err {
        StorageError::Permission(message) => assert_eq!(message, "No write permission"),
        other => panic!("expected permission error, got {other}"),
    }

    let stored = primary.find_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.field("title"), Some(&json!("T")));
}

#[tokio::test]
async fn read_by_stranger_is_denied() {
    let (engine, _) = secured_engine();
    let owner = SecurityContext::new("u1");
    let created = engine
        .create(fields(&[("title", json!("T"))]), Some(&owner), None)
        .await
        .unwrap();

    let stranger = SecurityContext::new("u2");
    let err = engine
        .read(&created.id, Some(&stranger), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Permission(_)));

    // The owner still reads it.
    assert!(engine
        .read(&created.id, Some(&owner), None)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn delete_requires_delete_permission() {
    let (engine, primary) = secured_engine();
    let owner = SecurityContext::new("u1");
    let created = engine
        .create(fields(&[("title", json!("T"))]), Some(&owner), None)
        .await
        .unwrap();

    let stranger = SecurityContext::new("u2");
    let err = engine
        .delete(&created.id, Some(&stranger), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Permission(_)));
    assert!(primary.find_by_id(&created.id).await.unwrap().is_some());

    assert!(engine.delete(&created.id, Some(&owner), None).await.unwrap());
    assert!(primary.is_empty());
}

#[tokio::test]
async fn secured_find_returns_only_permitted_instances() {
    let (engine, _) = secured_engine();
    let u1 = SecurityContext::new("u1");
    let u2 = SecurityContext::new("u2");

    engine
        .create(fields(&[("title", json!("mine-1"))]), Some(&u1), None)
        .await
        .unwrap();
    engine
        .create(fields(&[("title", json!("mine-2"))]), Some(&u1), None)
        .await
        .unwrap();
    let theirs = engine
        .create(fields(&[("title", json!("theirs"))]), Some(&u2), None)
        .await
        .unwrap();

    let visible = engine.find(&fields(&[]), Some(&u2), None, 0).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, theirs.id);

    let visible = engine.find(&fields(&[]), Some(&u1), None, 0).await.unwrap();
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn acl_grant_makes_record_visible_to_principal() {
    let (engine, _) = secured_engine();
    let owner = SecurityContext::new("u1");
    let created = engine
        .create(fields(&[("title", json!("shared"))]), Some(&owner), None)
        .await
        .unwrap();

    // Grant read access to the `editors` role alongside the owner grant.
    let mut acl = created.security.as_ref().unwrap().acl.clone();
    acl.push(
        omnistore_model::AclEntry::new("editors", vec![Permission::Read])
            .principal_type(omnistore_model::PrincipalKind::Role)
            .granted_by("u1"),
    );
    engine
        .update(
            &created.id,
            fields(&[("acl", serde_json::to_value(&acl).unwrap())]),
            Some(&owner),
            None,
        )
        .await
        .unwrap();

    let editor = SecurityContext::new("u3").with_roles(vec!["editors".into()]);
    let visible = engine
        .find(&fields(&[]), Some(&editor), None, 0)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, created.id);

    // Read permission does not grant write.
    let err = engine
        .update(
            &created.id,
            fields(&[("title", json!("hijacked"))]),
            Some(&editor),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Permission(_)));
}

#[tokio::test]
async fn sensitive_values_never_reach_the_operations_log() {
    let model = Arc::new(
        ModelDescriptor::builder("Account")
            .path("accounts")
            .binding("primary", StorageBinding::new(StorageKind::File))
            .sensitive("password", "{field}_uid")
            .build(),
    );
    let primary = Arc::new(MemoryDao::new(Arc::clone(&model)));
    let engine = UnifiedCrud::from_daos(
        model,
        vec![("primary".into(), primary as Arc<dyn Dao>)],
    );

    let created = engine
        .create(
            fields(&[("name", json!("alice")), ("password", json!("hunter2"))]),
            None,
            None,
        )
        .await
        .unwrap();
    engine
        .update(
            &created.id,
            fields(&[("password", json!("hunter3"))]),
            None,
            None,
        )
        .await
        .unwrap();

    let serialized = serde_json::to_string(&engine.operations_log()).unwrap();
    assert!(!serialized.contains("hunter2"));
    assert!(!serialized.contains("hunter3"));
    assert!(serialized.contains("password_uid_"));
}
