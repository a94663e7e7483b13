//! Storage configuration loaded from YAML.
//!
//! The file carries four sections: `storage_configs` (named backend
//! bindings), `model_defaults`, `connection_pools`, and `performance`.
//! String values may reference environment variables as `${VAR}` or
//! `${VAR:-default}`; substitutions that come out as pure integers or
//! `true`/`false` are coerced to typed values.
//!
//! `Settings` is an explicit handle: load it once at the composition root and
//! pass it down. There is no process-global configuration.

mod expand;

pub use expand::expand_value;

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Parsed and environment-expanded configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    root: serde_yaml::Value,
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_str(&content)
    }

    /// Parse settings from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> StorageResult<Self> {
        let mut root: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| StorageError::Configuration(format!("invalid YAML: {e}")))?;
        expand::expand_value(&mut root);
        Ok(Self { root })
    }

    /// Empty settings (no sections).
    pub fn empty() -> Self {
        Self {
            root: serde_yaml::Value::Null,
        }
    }

    fn section_value(&self, name: &str) -> Option<&serde_yaml::Value> {
        self.root.get(name)
    }

    /// Names declared under `storage_configs`.
    pub fn storage_names(&self) -> Vec<String> {
        match self.section_value("storage_configs") {
            Some(serde_yaml::Value::Mapping(map)) => map
                .keys()
                .filter_map(|k| k.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Deserialize one named entry of `storage_configs`.
    pub fn storage_config<T: DeserializeOwned>(&self, name: &str) -> StorageResult<T> {
        let configs = self
            .section_value("storage_configs")
            .ok_or_else(|| StorageError::Configuration("storage_configs section missing".into()))?;
        let entry = configs
            .get(name)
            .ok_or_else(|| StorageError::Configuration(format!("storage '{name}' not configured")))?;
        serde_yaml::from_value(entry.clone())
            .map_err(|e| StorageError::Configuration(format!("storage '{name}': {e}")))
    }

    /// Deserialize a whole top-level section, `Ok(None)` when absent.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> StorageResult<Option<T>> {
        match self.section_value(name) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(value) => serde_yaml::from_value(value.clone())
                .map(Some)
                .map_err(|e| StorageError::Configuration(format!("section '{name}': {e}"))),
        }
    }

    /// The `model_defaults` section as a raw value.
    pub fn model_defaults(&self) -> Option<&serde_yaml::Value> {
        self.section_value("model_defaults")
    }

    /// The `connection_pools` section as a raw value.
    pub fn connection_pools(&self) -> Option<&serde_yaml::Value> {
        self.section_value("connection_pools")
    }

    /// The `performance` section as a raw value.
    pub fn performance(&self) -> Option<&serde_yaml::Value> {
        self.section_value("performance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Binding {
        kind: String,
        host: String,
        port: u16,
        #[serde(default)]
        database: Option<String>,
    }

    const SAMPLE: &str = r#"
storage_configs:
  graph:
    kind: graph
    host: ${OMNISTORE_TEST_GRAPH_HOST:-localhost}
    port: ${OMNISTORE_TEST_GRAPH_PORT:-9080}
  cache:
    kind: cache
    host: localhost
    port: 6379
    database: "0"
connection_pools:
  max_size: 10
performance:
  parallel_writes: ${OMNISTORE_TEST_PARALLEL:-true}
"#;

    #[test]
    fn expands_defaults_and_coerces_types() {
        let settings = Settings::from_str(SAMPLE).unwrap();
        let graph: Binding = settings.storage_config("graph").unwrap();
        assert_eq!(graph.kind, "graph");
        assert_eq!(graph.host, "localhost");
        assert_eq!(graph.port, 9080);
        assert!(graph.database.is_none());
    }

    #[test]
    fn environment_overrides_default() {
        let yaml = r#"
storage_configs:
  graph:
    kind: graph
    host: localhost
    port: ${OMNISTORE_TEST_OVERRIDE_PORT:-9080}
"#;
        std::env::set_var("OMNISTORE_TEST_OVERRIDE_PORT", "19080");
        let settings = Settings::from_str(yaml).unwrap();
        let graph: Binding = settings.storage_config("graph").unwrap();
        assert_eq!(graph.port, 19080);
        std::env::remove_var("OMNISTORE_TEST_OVERRIDE_PORT");
    }

    #[test]
    fn lists_storage_names() {
        let settings = Settings::from_str(SAMPLE).unwrap();
        let mut names = settings.storage_names();
        names.sort();
        assert_eq!(names, vec!["cache", "graph"]);
    }

    #[test]
    fn missing_storage_is_configuration_error() {
        let settings = Settings::from_str(SAMPLE).unwrap();
        let err = settings.storage_config::<Binding>("vector").unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn boolean_coercion_applies_to_sections() {
        let settings = Settings::from_str(SAMPLE).unwrap();
        let perf = settings.performance().unwrap();
        assert_eq!(perf.get("parallel_writes").and_then(|v| v.as_bool()), Some(true));
    }
}
