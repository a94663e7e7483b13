//! ACL-based security model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Entity;

/// Unix-style permissions carried by ACL entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "m")]
    Modify,
    #[serde(rename = "d")]
    Delete,
    #[serde(rename = "x")]
    Execute,
    #[serde(rename = "a")]
    Admin,
}

/// What kind of principal an ACL entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    #[default]
    User,
    Role,
    Group,
    Service,
}

/// One access grant: a principal, a permission set, and an optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal_id: String,
    #[serde(default)]
    pub principal_type: PrincipalKind,
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub resource_path: Option<String>,
    #[serde(default)]
    pub conditions: Map<String, Value>,
    #[serde(default)]
    pub granted_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub granted_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AclEntry {
    pub fn new(principal_id: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_type: PrincipalKind::User,
            permissions,
            resource_path: None,
            conditions: Map::new(),
            granted_by: None,
            granted_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn granted_by(mut self, granter: impl Into<String>) -> Self {
        self.granted_by = Some(granter.into());
        self
    }

    pub fn expires_at(mut self, when: DateTime<Utc>) -> Self {
        self.expires_at = Some(when);
        self
    }

    pub fn principal_type(mut self, kind: PrincipalKind) -> Self {
        self.principal_type = kind;
        self
    }

    /// Whether this entry grants `permission`. Admin implies everything.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission) || self.permissions.contains(&Permission::Admin)
    }

    /// An entry past its `expires_at` is ignored.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }
}

/// Auth directive carried on secured models, mirrored into the graph
/// backend's rule configuration. Not interpreted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthDirective {
    pub rule: String,
    #[serde(default = "AuthDirective::default_operations")]
    pub operations: Vec<String>,
    #[serde(default)]
    pub and_rules: Vec<AuthDirective>,
    #[serde(default)]
    pub or_rules: Vec<AuthDirective>,
    #[serde(default)]
    pub not_rule: Option<Box<AuthDirective>>,
}

impl AuthDirective {
    fn default_operations() -> Vec<String> {
        ["query", "add", "update", "delete"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            operations: Self::default_operations(),
            and_rules: Vec::new(),
            or_rules: Vec::new(),
            not_rule: None,
        }
    }
}

/// Security fields attached to an entity of a secured model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityAttrs {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub acl: Vec<AclEntry>,
    #[serde(default)]
    pub auth_rules: Vec<AuthDirective>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub modified_by: Option<String>,
    /// Opaque node handle assigned by the graph backend; the canonical
    /// cross-backend correlator.
    #[serde(default)]
    pub graph_id: Option<String>,
}

/// The caller identity an operation runs under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub claims: Map<String, Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl SecurityContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            groups: Vec::new(),
            claims: Map::new(),
            session_id: None,
            ip_address: None,
            device_id: None,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    /// The principal set: user id, roles, and groups.
    pub fn principal_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(1 + self.roles.len() + self.groups.len());
        ids.push(self.user_id.clone());
        ids.extend(self.roles.iter().cloned());
        ids.extend(self.groups.iter().cloned());
        ids
    }
}

/// Check whether `ctx` holds `permission` on `entity`.
///
/// The owner always has effective admin. Otherwise any non-expired ACL entry
/// whose principal is in the context's principal set and which grants the
/// permission (or Admin) authorizes the operation.
pub fn check_permission(entity: &Entity, ctx: &SecurityContext, permission: Permission) -> bool {
    let Some(security) = &entity.security else {
        return true;
    };

    if security.owner_id.as_deref() == Some(ctx.user_id.as_str()) {
        return true;
    }

    let now = Utc::now();
    let principals = ctx.principal_ids();
    security.acl.iter().any(|entry| {
        principals.iter().any(|p| p == &entry.principal_id)
            && entry.has_permission(permission)
            && !entry.is_expired(now)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn secured_entity(owner: &str, acl: Vec<AclEntry>) -> Entity {
        let mut entity = Entity::new();
        entity.security = Some(SecurityAttrs {
            owner_id: Some(owner.to_string()),
            acl,
            ..SecurityAttrs::default()
        });
        entity
    }

    #[test]
    fn owner_has_every_permission() {
        let entity = secured_entity("u1", Vec::new());
        let ctx = SecurityContext::new("u1");
        for p in [
            Permission::Read,
            Permission::Write,
            Permission::Modify,
            Permission::Delete,
            Permission::Execute,
            Permission::Admin,
        ] {
            assert!(check_permission(&entity, &ctx, p));
        }
    }

    #[test]
    fn unrelated_context_is_denied() {
        let entity = secured_entity("u1", Vec::new());
        let ctx = SecurityContext::new("u2").with_roles(vec!["member".into()]);
        assert!(!check_permission(&entity, &ctx, Permission::Write));
    }

    #[test]
    fn role_grant_matches_principal_set() {
        let entity = secured_entity(
            "u1",
            vec![AclEntry::new("editors", vec![Permission::Write])
                .principal_type(PrincipalKind::Role)],
        );
        let ctx = SecurityContext::new("u2").with_roles(vec!["editors".into()]);
        assert!(check_permission(&entity, &ctx, Permission::Write));
        assert!(!check_permission(&entity, &ctx, Permission::Delete));
    }

    #[test]
    fn admin_grant_implies_all() {
        let entity = secured_entity("u1", vec![AclEntry::new("u2", vec![Permission::Admin])]);
        let ctx = SecurityContext::new("u2");
        assert!(check_permission(&entity, &ctx, Permission::Delete));
        assert!(check_permission(&entity, &ctx, Permission::Read));
    }

    #[test]
    fn expired_entries_are_ignored() {
        let expired = AclEntry::new("u2", vec![Permission::Read])
            .expires_at(Utc::now() - Duration::hours(1));
        let entity = secured_entity("u1", vec![expired]);
        let ctx = SecurityContext::new("u2");
        assert!(!check_permission(&entity, &ctx, Permission::Read));
    }

    #[test]
    fn unsecured_entity_allows_everything() {
        let entity = Entity::new();
        let ctx = SecurityContext::new("anyone");
        assert!(check_permission(&entity, &ctx, Permission::Admin));
    }

    #[test]
    fn permission_letter_codes_round_trip() {
        let json = serde_json::to_string(&Permission::Admin).unwrap();
        assert_eq!(json, "\"a\"");
        let back: Permission = serde_json::from_str("\"w\"").unwrap();
        assert_eq!(back, Permission::Write);
    }
}
