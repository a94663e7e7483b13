//! The stored record type shared by every backend adapter.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::security::SecurityAttrs;
use omnistore_core::ids::uuid7;

/// A JSON object in storage shape.
pub type Document = Map<String, Value>;

/// Keys that belong to [`SecurityAttrs`] rather than user fields.
pub const SECURITY_KEYS: [&str; 6] = [
    "owner_id",
    "acl",
    "auth_rules",
    "created_by",
    "modified_by",
    "graph_id",
];

/// A typed record with a UUIDv7 id, audit timestamps, dynamic user fields,
/// and optional security attributes.
///
/// `id` is immutable once assigned and `updated_at` never moves behind
/// `created_at`.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Document,
    pub security: Option<SecurityAttrs>,
}

impl Entity {
    /// Fresh entity with a generated id and current timestamps.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid7(),
            created_at: now,
            updated_at: now,
            fields: Document::new(),
            security: None,
        }
    }

    /// Fresh entity carrying the given user fields.
    pub fn from_fields(fields: Document) -> Self {
        let mut entity = Self::new();
        entity.fields = fields;
        entity
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a user field and bump `updated_at`.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
        self.touch();
    }

    /// Bump `updated_at`, keeping it monotonic w.r.t. `created_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.created_at);
    }

    /// Mutable access to security attributes, creating them when absent.
    pub fn security_mut(&mut self) -> &mut SecurityAttrs {
        self.security.get_or_insert_with(SecurityAttrs::default)
    }

    /// Flatten into the storage document shape: id, RFC3339 timestamps, user
    /// fields, and (for secured entities) the security keys.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("id".into(), Value::String(self.id.clone()));
        doc.insert(
            "created_at".into(),
            Value::String(self.created_at.to_rfc3339()),
        );
        doc.insert(
            "updated_at".into(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        for (key, value) in &self.fields {
            doc.insert(key.clone(), value.clone());
        }
        if let Some(security) = &self.security {
            if let Some(owner) = &security.owner_id {
                doc.insert("owner_id".into(), Value::String(owner.clone()));
            }
            doc.insert(
                "acl".into(),
                serde_json::to_value(&security.acl).unwrap_or(Value::Array(Vec::new())),
            );
            doc.insert(
                "auth_rules".into(),
                serde_json::to_value(&security.auth_rules).unwrap_or(Value::Array(Vec::new())),
            );
            if let Some(created_by) = &security.created_by {
                doc.insert("created_by".into(), Value::String(created_by.clone()));
            }
            if let Some(modified_by) = &security.modified_by {
                doc.insert("modified_by".into(), Value::String(modified_by.clone()));
            }
            if let Some(graph_id) = &security.graph_id {
                doc.insert("graph_id".into(), Value::String(graph_id.clone()));
            }
        }
        doc
    }

    /// Rebuild an entity from a storage document.
    ///
    /// `secured` controls whether the security keys are lifted into
    /// [`SecurityAttrs`]; for unsecured models they stay plain fields.
    pub fn from_document(mut doc: Document, secured: bool) -> Self {
        let id = match doc.remove("id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => uuid7(),
        };
        let created_at = take_timestamp(&mut doc, "created_at");
        let updated_at = take_timestamp(&mut doc, "updated_at").max(created_at);

        let security = if secured {
            let mut attrs = SecurityAttrs::default();
            attrs.owner_id = take_string(&mut doc, "owner_id");
            attrs.created_by = take_string(&mut doc, "created_by");
            attrs.modified_by = take_string(&mut doc, "modified_by");
            attrs.graph_id = take_string(&mut doc, "graph_id");
            if let Some(acl) = doc.remove("acl") {
                attrs.acl = serde_json::from_value(acl).unwrap_or_default();
            }
            if let Some(rules) = doc.remove("auth_rules") {
                attrs.auth_rules = serde_json::from_value(rules).unwrap_or_default();
            }
            Some(attrs)
        } else {
            None
        };

        Self {
            id,
            created_at,
            updated_at,
            fields: doc,
            security,
        }
    }

    /// Apply a field patch: security keys land in the attributes, everything
    /// else in the user fields; `updated_at` is bumped.
    pub fn apply_patch(&mut self, patch: &Document) {
        for (key, value) in patch {
            match key.as_str() {
                "id" | "created_at" | "updated_at" => {}
                "owner_id" => {
                    self.security_mut().owner_id = value.as_str().map(String::from);
                }
                "created_by" => {
                    self.security_mut().created_by = value.as_str().map(String::from);
                }
                "modified_by" => {
                    self.security_mut().modified_by = value.as_str().map(String::from);
                }
                "graph_id" => {
                    self.security_mut().graph_id = value.as_str().map(String::from);
                }
                "acl" => {
                    self.security_mut().acl =
                        serde_json::from_value(value.clone()).unwrap_or_default();
                }
                "auth_rules" => {
                    self.security_mut().auth_rules =
                        serde_json::from_value(value.clone()).unwrap_or_default();
                }
                _ => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
        self.touch();
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

fn take_timestamp(doc: &mut Document, key: &str) -> DateTime<Utc> {
    match doc.remove(key) {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        _ => Utc::now(),
    }
}

fn take_string(doc: &mut Document, key: &str) -> Option<String> {
    match doc.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{AclEntry, Permission};
    use omnistore_core::ids::is_uuid7;
    use serde_json::json;

    #[test]
    fn new_entity_has_v7_id_and_consistent_timestamps() {
        let entity = Entity::new();
        assert!(is_uuid7(&entity.id));
        assert!(entity.updated_at >= entity.created_at);
    }

    #[test]
    fn document_round_trip_preserves_fields() {
        let mut entity = Entity::new();
        entity.set_field("title", json!("T"));
        entity.set_field("count", json!(3));

        let doc = entity.to_document();
        let back = Entity::from_document(doc, false);
        assert_eq!(back.id, entity.id);
        assert_eq!(back.field("title"), Some(&json!("T")));
        assert_eq!(back.field("count"), Some(&json!(3)));
        assert!(back.security.is_none());
    }

    #[test]
    fn secured_round_trip_lifts_security_keys() {
        let mut entity = Entity::new();
        entity.set_field("title", json!("T"));
        {
            let security = entity.security_mut();
            security.owner_id = Some("u1".into());
            security.graph_id = Some("0x12".into());
            security.acl = vec![AclEntry::new("u1", vec![Permission::Admin])];
        }

        let doc = entity.to_document();
        assert_eq!(doc.get("owner_id"), Some(&json!("u1")));

        let back = Entity::from_document(doc, true);
        let security = back.security.as_ref().unwrap();
        assert_eq!(security.owner_id.as_deref(), Some("u1"));
        assert_eq!(security.graph_id.as_deref(), Some("0x12"));
        assert_eq!(security.acl.len(), 1);
        assert!(!back.fields.contains_key("owner_id"));
    }

    #[test]
    fn patch_updates_fields_and_modified_by() {
        let mut entity = Entity::new();
        entity.set_field("title", json!("old"));
        let before = entity.updated_at;

        let mut patch = Document::new();
        patch.insert("title".into(), json!("new"));
        patch.insert("modified_by".into(), json!("u2"));
        entity.apply_patch(&patch);

        assert_eq!(entity.field("title"), Some(&json!("new")));
        assert_eq!(
            entity.security.as_ref().unwrap().modified_by.as_deref(),
            Some("u2")
        );
        assert!(entity.updated_at >= before);
    }

    #[test]
    fn patch_cannot_change_id() {
        let mut entity = Entity::new();
        let original = entity.id.clone();
        let mut patch = Document::new();
        patch.insert("id".into(), json!("other"));
        entity.apply_patch(&patch);
        assert_eq!(entity.id, original);
    }
}
