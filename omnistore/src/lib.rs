//! # omnistore — declare a model once, bind it to many backends
//!
//! This facade crate re-exports the omnistore workspace through a single
//! dependency and wires the concrete adapters into a [`DaoFactory`].
//!
//! ```ignore
//! use omnistore::prelude::*;
//!
//! let model = Arc::new(
//!     ModelDescriptor::builder("Doc")
//!         .binding("graph", StorageBinding::new(StorageKind::Graph))
//!         .binding("cache", StorageBinding::new(StorageKind::Cache))
//!         .build(),
//! );
//! let factory = omnistore::default_factory();
//! let crud = UnifiedCrud::new(model, &factory)?;
//! let doc = crud.create(data, None, None).await?;
//! ```

pub use omnistore_core as core;
pub use omnistore_crud as crud;
pub use omnistore_dao as dao;
pub use omnistore_dgraph as dgraph;
pub use omnistore_model as model;
pub use omnistore_pgvector as pgvector;
pub use omnistore_postgres as postgres;
pub use omnistore_redis as redis;
pub use omnistore_rpc as rpc;
pub use omnistore_workers as workers;

use std::sync::Arc;

use omnistore_dao::{Dao, DaoFactory, MemoryDao};
use omnistore_model::storage::StorageKind;

/// A factory with every concrete adapter registered.
///
/// Graph, vector, relational, and cache bindings resolve to their drivers;
/// file bindings resolve to the in-process adapter. Document and timeseries
/// kinds stay unregistered and fail with a configuration error until a
/// deployment registers its own constructors.
pub fn default_factory() -> DaoFactory {
    let factory = DaoFactory::new();
    factory.register(StorageKind::Graph, |model, binding| {
        Ok(Arc::new(omnistore_dgraph::DgraphDao::new(model, binding)) as Arc<dyn Dao>)
    });
    factory.register(StorageKind::Vector, |model, binding| {
        Ok(Arc::new(omnistore_pgvector::PgVectorDao::new(model, binding)) as Arc<dyn Dao>)
    });
    factory.register(StorageKind::Relational, |model, binding| {
        Ok(Arc::new(omnistore_postgres::PostgresDao::new(model, binding)) as Arc<dyn Dao>)
    });
    factory.register(StorageKind::Cache, |model, binding| {
        Ok(Arc::new(omnistore_redis::RedisDao::new(model, binding)) as Arc<dyn Dao>)
    });
    factory.register(StorageKind::File, |model, _binding| {
        Ok(Arc::new(MemoryDao::new(model)) as Arc<dyn Dao>)
    });
    factory
}

/// Re-exports of the most commonly used types across the workspace.
pub mod prelude {
    pub use crate::default_factory;
    pub use omnistore_core::prelude::*;
    pub use omnistore_crud::prelude::*;
    pub use omnistore_dao::prelude::*;
    pub use omnistore_model::prelude::*;
    pub use omnistore_rpc::{DataOpsService, SERVICE_PRINCIPAL};
    pub use omnistore_workers::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnistore_model::storage::{ModelDescriptor, StorageBinding};

    #[test]
    fn default_factory_covers_concrete_kinds() {
        let factory = default_factory();
        let mut kinds = factory.registered_kinds();
        kinds.sort_by_key(|k| k.to_string());
        assert_eq!(
            kinds,
            vec![
                StorageKind::Cache,
                StorageKind::File,
                StorageKind::Graph,
                StorageKind::Relational,
                StorageKind::Vector,
            ]
        );
    }

    #[test]
    fn unregistered_kinds_fail_with_configuration_error() {
        let factory = default_factory();
        let model = Arc::new(
            ModelDescriptor::builder("Doc")
                .binding("document", StorageBinding::new(StorageKind::Document))
                .build(),
        );
        let err = match factory.create(&model, "document") {
            Err(err) => err,
            Ok(_) => panic!("expected create to fail"),
        };
        assert!(matches!(
            err,
            omnistore_core::StorageError::Configuration(_)
        ));
    }
}
