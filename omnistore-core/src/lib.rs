//! # omnistore-core — shared runtime for the omnistore data layer
//!
//! This crate carries the pieces every other omnistore crate leans on:
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | [`StorageError`] taxonomy shared by adapters and the engine |
//! | [`ids`] | UUIDv7 generation, validation, and timestamp extraction |
//! | [`config`] | YAML settings with `${VAR:-default}` expansion |
//! | [`logging`] | `tracing` subscriber bootstrap for binaries and tests |
//!
//! Backend crates wrap their driver errors into [`StorageError`] (see
//! [`StorageError::backend`]) so callers never see driver types leak through
//! the public API.

pub mod config;
pub mod error;
pub mod ids;
pub mod logging;

pub use config::Settings;
pub use error::{StorageError, StorageResult};

/// Re-exports of the most commonly used core types.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{StorageError, StorageResult};
    pub use crate::ids::{extract_timestamp_ms, is_uuid7, uuid7, uuid7_prefixed};
}
