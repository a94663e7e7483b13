//! Shared fixtures for the engine suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use omnistore_core::{StorageError, StorageResult};
use omnistore_dao::{Dao, MemoryDao, Query};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::storage::{ModelDescriptor, StorageBinding, StorageKind};

pub fn doc_model(secured: bool, bindings: &[&str]) -> Arc<ModelDescriptor> {
    let mut builder = ModelDescriptor::builder("Doc").path("docs").secured(secured);
    for name in bindings {
        builder = builder.binding(*name, StorageBinding::new(StorageKind::File));
    }
    Arc::new(builder.build())
}

pub fn fields(pairs: &[(&str, Value)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Memory adapter with switchable write failures, for rollback and
/// secondary-error paths.
pub struct FlakyDao {
    inner: MemoryDao,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
}

impl FlakyDao {
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        Self {
            inner: MemoryDao::new(model),
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub fn fail_creates(self, fail: bool) -> Self {
        self.fail_creates.store(fail, Ordering::SeqCst);
        self
    }

    pub fn fail_updates(self, fail: bool) -> Self {
        self.fail_updates.store(fail, Ordering::SeqCst);
        self
    }

    pub fn stored(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl Dao for FlakyDao {
    async fn connect(&self) -> StorageResult<()> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> StorageResult<()> {
        self.inner.disconnect().await
    }

    async fn test_connection(&self) -> bool {
        self.inner.test_connection().await
    }

    async fn create(&self, entity: &Entity) -> StorageResult<String> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::Query("write rejected".into()));
        }
        self.inner.create(entity).await
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>> {
        self.inner.find_by_id(id).await
    }

    async fn find_one(&self, query: &Query) -> StorageResult<Option<Entity>> {
        self.inner.find_one(query).await
    }

    async fn find(
        &self,
        query: &Query,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>> {
        self.inner.find(query, limit, skip).await
    }

    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Query("write rejected".into()));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete(id).await
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        self.inner.count(query).await
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        self.inner.exists(id).await
    }

    async fn create_indexes(&self) -> StorageResult<()> {
        self.inner.create_indexes().await
    }

    async fn raw_read_query(&self, query: &str, params: &[Value]) -> StorageResult<Vec<Document>> {
        self.inner.raw_read_query(query, params).await
    }

    async fn raw_write_query(&self, query: &str, params: &[Value]) -> StorageResult<u64> {
        self.inner.raw_write_query(query, params).await
    }

    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        self.inner.list_databases().await
    }

    async fn list_schemas(&self, database: Option<&str>) -> StorageResult<Vec<String>> {
        self.inner.list_schemas(database).await
    }

    async fn list_models(
        &self,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.inner.list_models(database, schema).await
    }

    async fn get_model_info(&self, path: &str) -> StorageResult<Document> {
        self.inner.get_model_info(path).await
    }

    async fn get_model_fields(&self, path: &str) -> StorageResult<Vec<Document>> {
        self.inner.get_model_fields(path).await
    }

    async fn get_model_indexes(&self, path: &str) -> StorageResult<Vec<Document>> {
        self.inner.get_model_indexes(path).await
    }
}
