//! # omnistore-workers — a generic worker-pool runtime
//!
//! Bounded pools of execution units hosting blocking or CPU-bound work, with
//! lifecycle management the adapters rely on for driver calls and embedding
//! generation.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`WorkerPool`] | Generic pool: submit / get_result / acquire / release, warmup, TTL, hibernation, health checks |
//! | [`ThreadBackend`] | One dedicated OS thread per worker with an in-process state map |
//! | [`ProcessBackend`] | One child process per worker speaking line-delimited JSON over stdio |
//! | [`TaskRegistry`] | Named task functions, the typed analog of `module:function` strings |
//! | [`PoolManager`] | Named-pool registry with shared shutdown |
//!
//! Worker lifecycle: `Starting → Idle ↔ Busy`, idle workers may move to
//! `Hibernating`, and termination goes through `Stopping → Dead`. Tasks move
//! `Pending → Active → Completed | Failed`; higher priority dispatches first
//! with FIFO tie-breaks.

pub mod manager;
pub mod pool;
pub mod process;
pub mod registry;
pub mod thread;
pub mod types;

pub use manager::PoolManager;
pub use pool::{PoolHandle, WorkerPool};
pub use process::ProcessBackend;
pub use registry::{TaskRegistry, WorkerContext};
pub use thread::ThreadBackend;
pub use types::{
    PoolError, PoolFlavor, PoolSettings, PoolStats, TaskOptions, TaskPayload, TaskState,
    WorkerBackend, WorkerState,
};

/// Re-exports of the most commonly used pool types.
pub mod prelude {
    pub use crate::manager::PoolManager;
    pub use crate::pool::WorkerPool;
    pub use crate::registry::TaskRegistry;
    pub use crate::thread::ThreadBackend;
    pub use crate::types::{PoolError, PoolFlavor, PoolSettings, TaskOptions, TaskPayload};
}
