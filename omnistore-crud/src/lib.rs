//! # omnistore-crud — the unified CRUD engine
//!
//! One entry point for create / read / update / delete / find across every
//! backend a model is bound to. The engine picks target adapters from the
//! model's bindings, applies the configured [`SyncStrategy`], records each
//! per-backend attempt in an operations log, and enforces ACL security for
//! secured models.
//!
//! | Strategy | Behavior |
//! |----------|----------|
//! | `Sequential` | Binding order; rollback prior successes on failure |
//! | `Parallel` | Fan out at once; any failure rolls everything back |
//! | `PrimaryFirst` (default) | Primary synchronously, secondaries fanned out, secondary errors logged only |
//! | `Eventual` | Primary synchronously, background replication to the rest |

pub mod engine;
pub mod registry;
pub mod types;

pub use engine::UnifiedCrud;
pub use registry::CrudRegistry;
pub use types::{OpStatus, StorageOperation, SyncStrategy};

/// Re-exports of the most commonly used engine types.
pub mod prelude {
    pub use crate::engine::UnifiedCrud;
    pub use crate::registry::CrudRegistry;
    pub use crate::types::{StorageOperation, SyncStrategy};
}
