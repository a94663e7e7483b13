//! Strategy and operation-log types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use omnistore_model::entity::Document;

/// How writes are ordered and combined across a model's bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Adapters in binding declaration order; failure rolls back prior
    /// successes and propagates.
    Sequential,
    /// All adapters at once; any failure rolls back the successes.
    Parallel,
    /// Primary synchronously, then secondaries concurrently; secondary
    /// failures are logged, not raised.
    #[default]
    PrimaryFirst,
    /// Primary synchronously, secondaries replicated by a background task.
    /// Fire-and-forget: there is no retry or durable log, so a crashed
    /// replication is lost (an at-least-once replicator is out of scope).
    Eventual,
}

/// Outcome of one per-backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Pending,
    Success,
    Failed,
}

/// One entry of the append-only operations log.
///
/// `data` is redacted before logging, so sensitive field values never appear
/// here.
#[derive(Debug, Clone, Serialize)]
pub struct StorageOperation {
    pub storage_name: String,
    pub operation: String,
    pub data: Document,
    pub status: OpStatus,
    pub error: Option<String>,
    pub result: Option<Value>,
}

impl StorageOperation {
    pub fn new(storage_name: impl Into<String>, operation: impl Into<String>, data: Document) -> Self {
        Self {
            storage_name: storage_name.into(),
            operation: operation.into(),
            data,
            status: OpStatus::Pending,
            error: None,
            result: None,
        }
    }

    pub fn succeed(mut self, result: impl Into<Value>) -> Self {
        self.status = OpStatus::Success;
        self.result = Some(result.into());
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = OpStatus::Failed;
        self.error = Some(error.into());
        self
    }
}
