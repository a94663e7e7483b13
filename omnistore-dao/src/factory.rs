//! Backend-kind → adapter constructor registry.
//!
//! The factory is an explicit handle created at the composition root and
//! passed down; there is no process-wide registry. The facade crate wires the
//! concrete adapters in; kinds without a registered constructor fail with a
//! configuration error (document / timeseries / file remain unregistered
//! here).

use std::sync::Arc;

use dashmap::DashMap;

use crate::dao::Dao;
use omnistore_core::{StorageError, StorageResult};
use omnistore_model::storage::{ModelDescriptor, StorageBinding, StorageKind};

/// Builds an adapter for a model bound to one backend instance.
pub type DaoConstructor =
    Arc<dyn Fn(Arc<ModelDescriptor>, StorageBinding) -> StorageResult<Arc<dyn Dao>> + Send + Sync>;

/// Registry of adapter constructors keyed by storage kind.
#[derive(Clone, Default)]
pub struct DaoFactory {
    constructors: Arc<DashMap<StorageKind, DaoConstructor>>,
}

impl DaoFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for a kind.
    pub fn register(
        &self,
        kind: StorageKind,
        constructor: impl Fn(Arc<ModelDescriptor>, StorageBinding) -> StorageResult<Arc<dyn Dao>>
            + Send
            + Sync
            + 'static,
    ) {
        self.constructors.insert(kind, Arc::new(constructor));
    }

    pub fn registered_kinds(&self) -> Vec<StorageKind> {
        self.constructors.iter().map(|e| *e.key()).collect()
    }

    /// Build the adapter for one named binding of a model.
    pub fn create(&self, model: &Arc<ModelDescriptor>, binding_name: &str) -> StorageResult<Arc<dyn Dao>> {
        let binding = model.binding(binding_name).ok_or_else(|| {
            StorageError::Configuration(format!(
                "storage '{binding_name}' not configured for model {}",
                model.name
            ))
        })?;
        self.create_for_binding(model, binding.clone())
    }

    /// Build an adapter directly from a binding.
    pub fn create_for_binding(
        &self,
        model: &Arc<ModelDescriptor>,
        binding: StorageBinding,
    ) -> StorageResult<Arc<dyn Dao>> {
        let constructor = self.constructors.get(&binding.kind).ok_or_else(|| {
            StorageError::Configuration(format!(
                "no adapter registered for storage kind: {}",
                binding.kind
            ))
        })?;
        constructor(Arc::clone(model), binding)
    }

    /// Build adapters for every binding of a model, in declaration order.
    pub fn create_all(
        &self,
        model: &Arc<ModelDescriptor>,
    ) -> StorageResult<Vec<(String, Arc<dyn Dao>)>> {
        let mut daos = Vec::with_capacity(model.bindings.len());
        for (name, binding) in &model.bindings {
            daos.push((name.clone(), self.create_for_binding(model, binding.clone())?));
        }
        Ok(daos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDao;

    fn model() -> Arc<ModelDescriptor> {
        Arc::new(
            ModelDescriptor::builder("Doc")
                .binding("cache", StorageBinding::new(StorageKind::Cache))
                .binding("file", StorageBinding::new(StorageKind::File))
                .build(),
        )
    }

    #[test]
    fn unregistered_kind_is_configuration_error() {
        let factory = DaoFactory::new();
        let err = match factory.create(&model(), "cache") {
            Err(err) => err,
            Ok(_) => panic!("expected create to fail"),
        };
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn unknown_binding_name_is_configuration_error() {
        let factory = DaoFactory::new();
        let err = match factory.create(&model(), "nope") {
            Err(err) => err,
            Ok(_) => panic!("expected create to fail"),
        };
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn registered_constructor_is_used() {
        let factory = DaoFactory::new();
        factory.register(StorageKind::Cache, |model, _binding| {
            Ok(Arc::new(MemoryDao::new(model)) as Arc<dyn Dao>)
        });
        assert!(factory.create(&model(), "cache").is_ok());
        assert_eq!(factory.registered_kinds(), vec![StorageKind::Cache]);
    }

    #[test]
    fn create_all_preserves_declaration_order() {
        let factory = DaoFactory::new();
        factory.register(StorageKind::Cache, |model, _| {
            Ok(Arc::new(MemoryDao::new(model)) as Arc<dyn Dao>)
        });
        factory.register(StorageKind::File, |model, _| {
            Ok(Arc::new(MemoryDao::new(model)) as Arc<dyn Dao>)
        });
        let daos = factory.create_all(&model()).unwrap();
        let names: Vec<_> = daos.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["cache", "file"]);
    }
}
