//! Storage backend kinds, bindings, and per-model metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Supported storage backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Relational,
    Document,
    Timeseries,
    Vector,
    Graph,
    Cache,
    File,
}

impl StorageKind {
    /// The engine conventionally backing this kind.
    pub fn engine(self) -> &'static str {
        match self {
            StorageKind::Relational => "postgres",
            StorageKind::Document => "mongodb",
            StorageKind::Timeseries => "prometheus",
            StorageKind::Vector => "pgvector",
            StorageKind::Graph => "dgraph",
            StorageKind::Cache => "redis",
            StorageKind::File => "file",
        }
    }

    /// Kind-specific default port; `None` for file storage.
    pub fn default_port(self) -> Option<u16> {
        match self {
            StorageKind::Relational | StorageKind::Vector => Some(5432),
            StorageKind::Document => Some(27017),
            StorageKind::Timeseries => Some(9090),
            StorageKind::Graph => Some(9080),
            StorageKind::Cache => Some(6379),
            StorageKind::File => None,
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageKind::Relational => "relational",
            StorageKind::Document => "document",
            StorageKind::Timeseries => "timeseries",
            StorageKind::Vector => "vector",
            StorageKind::Graph => "graph",
            StorageKind::Cache => "cache",
            StorageKind::File => "file",
        };
        f.write_str(name)
    }
}

/// A named configuration tying a model to one backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageBinding {
    pub kind: StorageKind,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Connection attempt deadline in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub options: Map<String, Value>,
    /// Explicit connection string; overrides the kind formatter when present.
    #[serde(default)]
    pub connection_string: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl StorageBinding {
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            host: default_host(),
            port: None,
            database: None,
            username: None,
            password: None,
            timeout_secs: None,
            options: Map::new(),
            connection_string: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The effective port: explicit value or the kind default.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.kind.default_port())
    }

    /// Render the connection string for this binding.
    ///
    /// An explicit `connection_string` wins; otherwise the kind formatter is
    /// applied to the components.
    pub fn render_connection_string(&self) -> String {
        if let Some(explicit) = &self.connection_string {
            return explicit.clone();
        }
        let host = &self.host;
        let port = self.effective_port().unwrap_or(0);
        let user = self.username.as_deref().unwrap_or("");
        let pass = self.password.as_deref().unwrap_or("");
        let db = self.database.as_deref().unwrap_or("");
        match self.kind {
            StorageKind::Relational | StorageKind::Vector => {
                format!("postgresql://{user}:{pass}@{host}:{port}/{db}")
            }
            StorageKind::Document => format!("mongodb://{user}:{pass}@{host}:{port}/{db}"),
            StorageKind::Cache => {
                let db = self.database.as_deref().unwrap_or("0");
                format!("redis://{host}:{port}/{db}")
            }
            StorageKind::Graph => format!("{host}:{port}"),
            StorageKind::Timeseries => format!("http://{host}:{port}"),
            StorageKind::File => self
                .options
                .get("base_path")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| std::env::temp_dir().display().to_string()),
        }
    }
}

/// Declared type of an entity field; drives graph schema synthesis and
/// model introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    DateTime,
    StringList,
    Json,
}

/// One declared entity field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Index flavor, interpreted per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Hash,
    Text,
    Fulltext,
    Exact,
    Gin,
    Btree,
    Vector,
}

/// One declared index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn new(field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

/// Per-model metadata: where the model lives and how.
///
/// Bindings keep declaration order; the first binding is the primary (the
/// source of truth under primary-first replication, and the canonical UID
/// source when graph-bound).
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    /// Collection / table / type name.
    pub path: String,
    /// Field carrying the unique identifier.
    pub id_field: String,
    pub bindings: Vec<(String, StorageBinding)>,
    pub fields: Vec<FieldSpec>,
    pub indexes: Vec<IndexSpec>,
    pub options: Map<String, Value>,
    /// field name → mask template applied by [`crate::sanitize`].
    pub sensitive_fields: Vec<(String, String)>,
    /// Secured models require a security context and carry ACLs.
    pub secured: bool,
}

impl ModelDescriptor {
    pub fn builder(name: impl Into<String>) -> ModelDescriptorBuilder {
        ModelDescriptorBuilder::new(name)
    }

    /// The first-declared binding.
    pub fn primary_binding(&self) -> Option<(&str, &StorageBinding)> {
        self.bindings.first().map(|(n, b)| (n.as_str(), b))
    }

    pub fn binding(&self, name: &str) -> Option<&StorageBinding> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_for(&self, field: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.field == field)
    }

    pub fn mask_template(&self, field: &str) -> Option<&str> {
        self.sensitive_fields
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, t)| t.as_str())
    }
}

/// Fluent builder for [`ModelDescriptor`].
#[derive(Debug, Clone)]
pub struct ModelDescriptorBuilder {
    name: String,
    path: Option<String>,
    id_field: String,
    bindings: Vec<(String, StorageBinding)>,
    fields: Vec<FieldSpec>,
    indexes: Vec<IndexSpec>,
    options: Map<String, Value>,
    sensitive_fields: Vec<(String, String)>,
    secured: bool,
}

impl ModelDescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name,
            path: None,
            id_field: "id".to_string(),
            bindings: Vec::new(),
            fields: Vec::new(),
            indexes: Vec::new(),
            options: Map::new(),
            sensitive_fields: Vec::new(),
            secured: false,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn binding(mut self, name: impl Into<String>, binding: StorageBinding) -> Self {
        self.bindings.push((name.into(), binding));
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Mark a field sensitive with the given mask template.
    pub fn sensitive(mut self, field: impl Into<String>, template: impl Into<String>) -> Self {
        self.sensitive_fields.push((field.into(), template.into()));
        self
    }

    pub fn secured(mut self, secured: bool) -> Self {
        self.secured = secured;
        self
    }

    pub fn build(self) -> ModelDescriptor {
        let path = self
            .path
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()));
        ModelDescriptor {
            name: self.name,
            path,
            id_field: self.id_field,
            bindings: self.bindings,
            fields: self.fields,
            indexes: self.indexes,
            options: self.options,
            sensitive_fields: self.sensitive_fields,
            secured: self.secured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_per_kind() {
        assert_eq!(StorageKind::Graph.default_port(), Some(9080));
        assert_eq!(StorageKind::Cache.default_port(), Some(6379));
        assert_eq!(StorageKind::Vector.default_port(), Some(5432));
        assert_eq!(StorageKind::File.default_port(), None);
    }

    #[test]
    fn connection_strings_per_kind() {
        let pg = StorageBinding::new(StorageKind::Relational)
            .host("db")
            .database("app")
            .credentials("u", "p");
        assert_eq!(pg.render_connection_string(), "postgresql://u:p@db:5432/app");

        let cache = StorageBinding::new(StorageKind::Cache);
        assert_eq!(cache.render_connection_string(), "redis://localhost:6379/0");

        let graph = StorageBinding::new(StorageKind::Graph).host("alpha");
        assert_eq!(graph.render_connection_string(), "alpha:9080");

        let ts = StorageBinding::new(StorageKind::Timeseries);
        assert_eq!(ts.render_connection_string(), "http://localhost:9090");
    }

    #[test]
    fn explicit_connection_string_wins() {
        let mut binding = StorageBinding::new(StorageKind::Relational);
        binding.connection_string = Some("postgresql://elsewhere/db".into());
        assert_eq!(binding.render_connection_string(), "postgresql://elsewhere/db");
    }

    #[test]
    fn builder_defaults_path_from_name() {
        let model = ModelDescriptor::builder("Doc")
            .binding("graph", StorageBinding::new(StorageKind::Graph))
            .binding("cache", StorageBinding::new(StorageKind::Cache))
            .build();
        assert_eq!(model.path, "docs");
        assert_eq!(model.id_field, "id");
        let (primary, binding) = model.primary_binding().unwrap();
        assert_eq!(primary, "graph");
        assert_eq!(binding.kind, StorageKind::Graph);
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&StorageKind::Graph).unwrap();
        assert_eq!(json, "\"graph\"");
        let back: StorageKind = serde_json::from_str("\"cache\"").unwrap();
        assert_eq!(back, StorageKind::Cache);
    }
}
