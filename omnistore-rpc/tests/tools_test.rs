use std::sync::Arc;

use serde_json::{json, Value};

use omnistore_core::ids::is_uuid7;
use omnistore_crud::{CrudRegistry, UnifiedCrud};
use omnistore_dao::{Dao, MemoryDao};
use omnistore_model::storage::{FieldKind, FieldSpec, ModelDescriptor, StorageBinding, StorageKind};
use omnistore_rpc::{DataOpsService, SERVICE_PRINCIPAL};

fn service() -> DataOpsService {
    let registry = Arc::new(CrudRegistry::new());

    let doc_model = Arc::new(
        ModelDescriptor::builder("Doc")
            .path("docs")
            .binding("primary", StorageBinding::new(StorageKind::File))
            .field(FieldSpec::new("title", FieldKind::String).required())
            .field(FieldSpec::new("views", FieldKind::Int))
            .build(),
    );
    let doc_dao = Arc::new(MemoryDao::new(Arc::clone(&doc_model))) as Arc<dyn Dao>;
    registry.register(Arc::new(UnifiedCrud::from_daos(
        doc_model,
        vec![("primary".into(), doc_dao)],
    )));

    let account_model = Arc::new(
        ModelDescriptor::builder("Account")
            .path("accounts")
            .binding("primary", StorageBinding::new(StorageKind::File))
            .sensitive("password", "{field}_uid")
            .build(),
    );
    let account_dao = Arc::new(MemoryDao::new(Arc::clone(&account_model))) as Arc<dyn Dao>;
    registry.register(Arc::new(UnifiedCrud::from_daos(
        account_model,
        vec![("primary".into(), account_dao)],
    )));

    DataOpsService::new(registry)
}

async fn call(service: &DataOpsService, tool: &str, args: Value) -> Value {
    service.execute_tool(tool, args).await
}

// ── dataops ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_read_update_delete_round_trip() {
    let service = service();
    let ctx = json!({ "user_id": "u1" });

    let created = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Doc",
            "data": { "title": "T", "views": 1 },
            "context": ctx.clone(),
        }),
    )
    .await;
    let id = created.get("id").and_then(Value::as_str).unwrap().to_string();
    assert!(is_uuid7(&id));
    assert_eq!(created.get("title"), Some(&json!("T")));

    let read = call(
        &service,
        "dataops",
        json!({
            "operation": "read",
            "model": "doc",
            "data": { "id": &id },
            "context": ctx.clone(),
        }),
    )
    .await;
    assert_eq!(read.get("title"), Some(&json!("T")));

    let updated = call(
        &service,
        "dataops",
        json!({
            "operation": "update",
            "model": "Doc",
            "data": { "id": &id, "title": "T2" },
            "context": ctx.clone(),
        }),
    )
    .await;
    assert_eq!(updated.get("title"), Some(&json!("T2")));

    let deleted = call(
        &service,
        "dataops",
        json!({
            "operation": "delete",
            "model": "Doc",
            "data": { "id": &id },
            "context": ctx.clone(),
        }),
    )
    .await;
    assert_eq!(deleted, json!({ "deleted": true }));

    let missing = call(
        &service,
        "dataops",
        json!({
            "operation": "read",
            "model": "Doc",
            "data": { "id": &id },
            "context": ctx.clone(),
        }),
    )
    .await;
    assert_eq!(missing, json!({ "error": "Not found" }));
}

#[tokio::test]
async fn unknown_model_and_tool_are_error_responses() {
    let service = service();
    let response = call(
        &service,
        "dataops",
        json!({ "operation": "create", "model": "Ghost", "data": {} }),
    )
    .await;
    assert_eq!(response, json!({ "error": "Unknown model: Ghost" }));

    let response = call(&service, "no_such_tool", json!({})).await;
    assert!(response
        .get("error")
        .and_then(Value::as_str)
        .unwrap()
        .contains("Unknown tool"));
}

#[tokio::test]
async fn json_and_yaml_payloads_parse() {
    let service = service();
    let ctx = json!({ "user_id": "u1" });

    let from_json = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Doc",
            "data": "{\"title\": \"from json\"}",
            "format": "json",
            "context": ctx.clone(),
        }),
    )
    .await;
    assert_eq!(from_json.get("title"), Some(&json!("from json")));

    let from_yaml = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Doc",
            "data": "title: from yaml\nviews: 2\n",
            "format": "yaml",
            "context": ctx.clone(),
        }),
    )
    .await;
    assert_eq!(from_yaml.get("title"), Some(&json!("from yaml")));
    assert_eq!(from_yaml.get("views"), Some(&json!(2)));

    let bad = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Doc",
            "data": "{not json",
            "format": "json",
        }),
    )
    .await;
    assert!(bad.get("error").is_some());
}

// ── Sanitization at the boundary ───────────────────────────────────────────

#[tokio::test]
async fn service_audience_gets_masked_output() {
    let service = service();

    // No context: sanitized.
    let anonymous = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Account",
            "data": { "name": "alice", "password": "hunter2" },
        }),
    )
    .await;
    let masked = anonymous.get("password").and_then(Value::as_str).unwrap();
    assert!(masked.starts_with("password_uid_"));
    assert!(!masked.contains("hunter2"));

    // The service principal: sanitized too.
    let via_service = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Account",
            "data": { "name": "bob", "password": "hunter2" },
            "context": { "user_id": SERVICE_PRINCIPAL },
        }),
    )
    .await;
    assert!(via_service
        .get("password")
        .and_then(Value::as_str)
        .unwrap()
        .starts_with("password_uid_"));

    // A named user sees the stored value.
    let as_user = call(
        &service,
        "dataops",
        json!({
            "operation": "create",
            "model": "Account",
            "data": { "name": "carol", "password": "hunter2" },
            "context": { "user_id": "u1" },
        }),
    )
    .await;
    assert_eq!(as_user.get("password"), Some(&json!("hunter2")));
}

// ── dataops_info ───────────────────────────────────────────────────────────

#[tokio::test]
async fn info_describes_models() {
    let service = service();

    let info = call(&service, "dataops_info", json!({ "model": "Doc" })).await;
    assert_eq!(info.get("name"), Some(&json!("Doc")));
    assert_eq!(info.get("path"), Some(&json!("docs")));
    assert_eq!(info.get("primary_storage"), Some(&json!("primary")));
    assert_eq!(info.get("secured"), Some(&json!(false)));
    let fields = info.get("fields").and_then(Value::as_array).unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].get("name"), Some(&json!("title")));
    assert_eq!(fields[0].get("required"), Some(&json!(true)));

    let all = call(&service, "dataops_info", json!({})).await;
    let models = all.get("models").and_then(Value::as_object).unwrap();
    assert!(models.contains_key("Account"));
    assert!(models.contains_key("Doc"));
    assert_eq!(
        models["Account"].get("sensitive_fields"),
        Some(&json!(["password"]))
    );
}

// ── dataops_batch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_collects_results() {
    let service = service();
    let response = call(
        &service,
        "dataops_batch",
        json!({
            "operations": [
                { "operation": "create", "model": "Doc", "data": { "title": "a" }, "context": { "user_id": "u1" } },
                { "operation": "create", "model": "Ghost", "data": {} },
                { "operation": "create", "model": "Doc", "data": { "title": "b" }, "context": { "user_id": "u1" } }
            ]
        }),
    )
    .await;
    let results = response.get("results").and_then(Value::as_array).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].get("id").is_some());
    assert!(results[1].get("error").is_some());
    assert!(results[2].get("id").is_some());
}

#[tokio::test]
async fn transactional_batch_aborts_on_first_failure() {
    let service = service();
    let response = call(
        &service,
        "dataops_batch",
        json!({
            "transaction": true,
            "operations": [
                { "operation": "create", "model": "Doc", "data": { "title": "a" }, "context": { "user_id": "u1" } },
                { "operation": "create", "model": "Ghost", "data": {} },
                { "operation": "create", "model": "Doc", "data": { "title": "never" }, "context": { "user_id": "u1" } }
            ]
        }),
    )
    .await;
    assert_eq!(response.get("completed"), Some(&json!(1)));
    assert_eq!(response.get("failed"), Some(&json!(1)));
    let results = response.get("results").and_then(Value::as_array).unwrap();
    assert_eq!(results.len(), 2, "the batch stopped at the failure");
}
