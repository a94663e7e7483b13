//! # omnistore-model — entities, bindings, and security metadata
//!
//! The model layer is driver-free: it defines what an entity *is* and how it
//! is bound to storage backends, leaving the talking-to-backends part to the
//! adapter crates.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`StorageKind`] | Backend family (relational, graph, cache, …) with engine names and default ports |
//! | [`StorageBinding`] | One named backend instance an entity is replicated to |
//! | [`ModelDescriptor`] | Per-model metadata: path, bindings, fields, indexes, sensitive fields |
//! | [`Entity`] | A stored record: id, timestamps, dynamic fields, optional security attributes |
//! | [`SecurityContext`] / [`AclEntry`] / [`Permission`] | ACL-based access control |
//! | [`sanitize`] | Pure projection masking sensitive fields for untrusted audiences |

pub mod entity;
pub mod security;
pub mod sensitive;
pub mod storage;

pub use entity::{Document, Entity};
pub use security::{
    check_permission, AclEntry, AuthDirective, Permission, PrincipalKind, SecurityAttrs,
    SecurityContext,
};
pub use sensitive::{render_mask, sanitize};
pub use storage::{
    FieldKind, FieldSpec, IndexKind, IndexSpec, ModelDescriptor, ModelDescriptorBuilder,
    StorageBinding, StorageKind,
};

/// Re-exports of the most commonly used model types.
pub mod prelude {
    pub use crate::entity::{Document, Entity};
    pub use crate::security::{
        check_permission, AclEntry, Permission, SecurityContext,
    };
    pub use crate::sensitive::sanitize;
    pub use crate::storage::{
        FieldKind, FieldSpec, IndexKind, IndexSpec, ModelDescriptor, StorageBinding, StorageKind,
    };
}
