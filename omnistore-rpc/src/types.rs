//! Tool request shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use omnistore_model::security::SecurityContext;

/// CRUD operations exposed by the `dataops` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

/// How the `data` argument is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Already-parsed object.
    #[default]
    Dict,
    /// JSON text.
    Json,
    /// YAML text.
    Yaml,
}

/// One `dataops` call.
#[derive(Debug, Deserialize)]
pub struct CrudRequest {
    pub operation: Operation,
    pub model: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub format: PayloadFormat,
    #[serde(default)]
    pub context: Option<SecurityContext>,
}

/// One entry of a `dataops_batch` call.
#[derive(Debug, Deserialize)]
pub struct BatchItem {
    pub operation: Operation,
    pub model: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub context: Option<SecurityContext>,
}
