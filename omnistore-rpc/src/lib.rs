//! # omnistore-rpc — the generic tool surface
//!
//! Three tools marshal to the unified CRUD engine:
//!
//! | Tool | Description |
//! |------|-------------|
//! | `dataops` | One CRUD operation against a registered model (`dict` / `json` / `yaml` payloads) |
//! | `dataops_info` | Model descriptors: fields, bindings, primary, security, sensitive field names |
//! | `dataops_batch` | A list of operations, optionally transactional (abort on first failure) |
//!
//! Tool calls never raise through the transport: every failure is encoded as
//! `{"error": ...}` in the response. Transports themselves (line-delimited
//! JSON, websocket frames) are external collaborators.

pub mod service;
pub mod types;

pub use service::{DataOpsService, SERVICE_PRINCIPAL};
pub use types::{BatchItem, CrudRequest, Operation, PayloadFormat};
