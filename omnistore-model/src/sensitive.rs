//! Sensitive-field projection.
//!
//! Masking runs at the serialization boundary every time an entity leaves the
//! process; the authoritative object is never mutated.

use serde_json::Value;

use crate::entity::{Document, Entity};
use crate::storage::ModelDescriptor;
use omnistore_core::ids::uuid7;

/// Project an entity to a document safe for an untrusted audience.
///
/// Each field named in the descriptor's sensitive map is replaced by its mask
/// template: a `{field}` placeholder expands to the field name, and a
/// template containing `uid` gets a fresh UUIDv7 appended so repeated masks
/// never collide.
pub fn sanitize(entity: &Entity, descriptor: &ModelDescriptor) -> Document {
    let mut doc = entity.to_document();
    for (field, template) in &descriptor.sensitive_fields {
        if doc.contains_key(field) {
            doc.insert(field.clone(), Value::String(render_mask(field, template)));
        }
    }
    doc
}

/// Render one mask. `{field}` expands to the field name; templates containing
/// `uid` get a fresh UUIDv7 appended.
pub fn render_mask(field: &str, template: &str) -> String {
    let mut masked = if template.contains("{field}") {
        template.replace("{field}", field)
    } else {
        template.to_string()
    };
    if template.to_lowercase().contains("uid") {
        masked = format!("{masked}_{}", uuid7());
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageBinding, StorageKind};
    use serde_json::json;

    fn model() -> ModelDescriptor {
        ModelDescriptor::builder("Account")
            .binding("cache", StorageBinding::new(StorageKind::Cache))
            .sensitive("password", "{field}_uid")
            .sensitive("api_key", "redacted")
            .build()
    }

    #[test]
    fn masks_replace_values() {
        let mut entity = Entity::new();
        entity.set_field("password", json!("hunter2"));
        entity.set_field("api_key", json!("sk-123"));
        entity.set_field("name", json!("alice"));

        let doc = sanitize(&entity, &model());
        let password = doc.get("password").unwrap().as_str().unwrap();
        assert!(password.starts_with("password_uid_"));
        assert!(!password.contains("hunter2"));
        assert_eq!(doc.get("api_key"), Some(&json!("redacted")));
        assert_eq!(doc.get("name"), Some(&json!("alice")));
    }

    #[test]
    fn uid_masks_are_unique_per_projection() {
        let mut entity = Entity::new();
        entity.set_field("password", json!("hunter2"));
        let model = model();
        let first = sanitize(&entity, &model);
        let second = sanitize(&entity, &model);
        assert_ne!(first.get("password"), second.get("password"));
    }

    #[test]
    fn source_entity_is_untouched() {
        let mut entity = Entity::new();
        entity.set_field("password", json!("hunter2"));
        let _ = sanitize(&entity, &model());
        assert_eq!(entity.field("password"), Some(&json!("hunter2")));
    }

    #[test]
    fn absent_fields_are_skipped() {
        let entity = Entity::new();
        let doc = sanitize(&entity, &model());
        assert!(!doc.contains_key("password"));
    }
}
