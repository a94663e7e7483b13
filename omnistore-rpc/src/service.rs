//! Tool dispatch over the CRUD registry.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::{BatchItem, CrudRequest, Operation, PayloadFormat};
use omnistore_crud::{CrudRegistry, UnifiedCrud};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::sensitive::sanitize;
use omnistore_model::security::SecurityContext;

/// The service principal; output for this caller (or for calls without a
/// context) is sanitized before leaving the process.
pub const SERVICE_PRINCIPAL: &str = "mcp_server";

/// Dispatches the three generic tools to registered engines.
pub struct DataOpsService {
    registry: Arc<CrudRegistry>,
}

impl DataOpsService {
    pub fn new(registry: Arc<CrudRegistry>) -> Self {
        Self { registry }
    }

    pub fn tool_names() -> [&'static str; 3] {
        ["dataops", "dataops_info", "dataops_batch"]
    }

    /// Entry point for transports: dispatch by tool name with raw JSON
    /// arguments. Failures come back as `{"error": ...}`, never as errors.
    pub async fn execute_tool(&self, tool: &str, arguments: Value) -> Value {
        match tool {
            "dataops" => match serde_json::from_value::<CrudRequest>(arguments) {
                Ok(request) => self.dataops(request).await,
                Err(e) => error_value(format!("invalid arguments: {e}")),
            },
            "dataops_info" => {
                let model = arguments
                    .get("model")
                    .and_then(Value::as_str)
                    .map(String::from);
                self.dataops_info(model.as_deref())
            }
            "dataops_batch" => {
                let transaction = arguments
                    .get("transaction")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let operations = match arguments.get("operations").cloned() {
                    Some(list) => match serde_json::from_value::<Vec<BatchItem>>(list) {
                        Ok(operations) => operations,
                        Err(e) => return error_value(format!("invalid operations: {e}")),
                    },
                    None => return error_value("operations is required"),
                };
                self.dataops_batch(operations, transaction).await
            }
            other => error_value(format!("Unknown tool: {other}")),
        }
    }

    /// One CRUD operation against a named model.
    pub async fn dataops(&self, request: CrudRequest) -> Value {
        let Some(engine) = self.registry.get(&request.model) else {
            return error_value(format!("Unknown model: {}", request.model));
        };
        let data = match parse_payload(request.data, request.format) {
            Ok(data) => data,
            Err(message) => return error_value(message),
        };
        debug!(model = %request.model, operation = ?request.operation, "Tool dispatch");
        self.run_operation(&engine, request.operation, data, request.context.as_ref())
            .await
    }

    async fn run_operation(
        &self,
        engine: &Arc<UnifiedCrud>,
        operation: Operation,
        data: Document,
        context: Option<&SecurityContext>,
    ) -> Value {
        match operation {
            Operation::Create => match engine.create(data, context, None).await {
                Ok(entity) => Value::Object(self.prepare_output(engine, &entity, context)),
                Err(e) => error_value(e.to_string()),
            },
            Operation::Read => {
                let Some(id) = data.get("id").and_then(Value::as_str) else {
                    return error_value("id is required for read");
                };
                match engine.read(id, context, None).await {
                    Ok(Some(entity)) => {
                        Value::Object(self.prepare_output(engine, &entity, context))
                    }
                    Ok(None) => error_value("Not found"),
                    Err(e) => error_value(e.to_string()),
                }
            }
            Operation::Update => {
                let Some(id) = data.get("id").and_then(Value::as_str).map(String::from) else {
                    return error_value("id is required for update");
                };
                let mut patch = data;
                patch.remove("id");
                match engine.update(&id, patch, context, None).await {
                    Ok(entity) => Value::Object(self.prepare_output(engine, &entity, context)),
                    Err(e) => error_value(e.to_string()),
                }
            }
            Operation::Delete => {
                let Some(id) = data.get("id").and_then(Value::as_str) else {
                    return error_value("id is required for delete");
                };
                match engine.delete(id, context, None).await {
                    Ok(deleted) => json!({ "deleted": deleted }),
                    Err(e) => error_value(e.to_string()),
                }
            }
        }
    }

    /// Model descriptors for one model, or all registered models.
    pub fn dataops_info(&self, model: Option<&str>) -> Value {
        match model {
            Some(name) => match self.registry.get(name) {
                Some(engine) => Value::Object(describe(&engine)),
                None => error_value(format!("Unknown model: {name}")),
            },
            None => {
                let mut models = Map::new();
                for name in self.registry.model_names() {
                    if let Some(engine) = self.registry.get(&name) {
                        models.insert(name, Value::Object(describe(&engine)));
                    }
                }
                json!({ "models": models })
            }
        }
    }

    /// A list of operations; in transaction mode the first failure aborts
    /// the batch and the response reports `{completed, failed}`.
    pub async fn dataops_batch(&self, operations: Vec<BatchItem>, transaction: bool) -> Value {
        let mut results = Vec::with_capacity(operations.len());
        for (index, item) in operations.into_iter().enumerate() {
            let result = self
                .dataops(CrudRequest {
                    operation: item.operation,
                    model: item.model,
                    data: item.data,
                    format: PayloadFormat::Dict,
                    context: item.context,
                })
                .await;
            let failed = result.get("error").is_some();
            results.push(result);
            if transaction && failed {
                return json!({
                    "error": "batch aborted",
                    "completed": index,
                    "failed": 1,
                    "results": results,
                });
            }
        }
        json!({ "results": results })
    }

    /// Project an entity for the caller. Output leaving to the service
    /// principal (or with no context at all) is sanitized.
    fn prepare_output(
        &self,
        engine: &Arc<UnifiedCrud>,
        entity: &Entity,
        context: Option<&SecurityContext>,
    ) -> Document {
        let untrusted = match context {
            Some(ctx) => ctx.user_id == SERVICE_PRINCIPAL,
            None => true,
        };
        if untrusted {
            sanitize(entity, engine.model())
        } else {
            entity.to_document()
        }
    }
}

fn error_value(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Parse the `data` argument per the declared format.
fn parse_payload(data: Option<Value>, format: PayloadFormat) -> Result<Document, String> {
    let Some(data) = data else {
        return Ok(Document::new());
    };
    let parsed = match (&data, format) {
        (Value::String(text), PayloadFormat::Json) => {
            serde_json::from_str::<Value>(text).map_err(|e| format!("invalid JSON data: {e}"))?
        }
        (Value::String(text), PayloadFormat::Yaml) => {
            serde_yaml::from_str::<Value>(text).map_err(|e| format!("invalid YAML data: {e}"))?
        }
        _ => data,
    };
    match parsed {
        Value::Object(doc) => Ok(doc),
        Value::Null => Ok(Document::new()),
        other => Err(format!("data must be an object, got: {other}")),
    }
}

/// The `dataops_info` view of one model.
fn describe(engine: &Arc<UnifiedCrud>) -> Document {
    let model = engine.model();
    let mut info = Document::new();
    info.insert("name".into(), Value::String(model.name.clone()));
    info.insert("path".into(), Value::String(model.path.clone()));
    info.insert(
        "fields".into(),
        Value::Array(
            model
                .fields
                .iter()
                .map(|field| {
                    json!({
                        "name": field.name,
                        "type": field.kind,
                        "required": field.required,
                        "default": field.default,
                    })
                })
                .collect(),
        ),
    );
    info.insert(
        "storages".into(),
        Value::Array(
            model
                .bindings
                .iter()
                .map(|(name, binding)| {
                    json!({ "name": name, "kind": binding.kind })
                })
                .collect(),
        ),
    );
    info.insert(
        "primary_storage".into(),
        model
            .primary_binding()
            .map(|(name, _)| Value::String(name.to_string()))
            .unwrap_or(Value::Null),
    );
    info.insert("secured".into(), Value::Bool(model.secured));
    info.insert(
        "sensitive_fields".into(),
        Value::Array(
            model
                .sensitive_fields
                .iter()
                .map(|(field, _)| Value::String(field.clone()))
                .collect(),
        ),
    );
    info
}
