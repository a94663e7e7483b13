//! In-process reference adapter.
//!
//! Backs the engine and RPC test suites and stands in for backends whose
//! drivers are not wired up in a deployment. Stores documents in a
//! concurrent map keyed by id; ids are UUIDv7, so id order is time order.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::dao::Dao;
use crate::query::Query;
use omnistore_core::{StorageError, StorageResult};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::storage::ModelDescriptor;

/// DashMap-backed adapter implementing the full contract.
pub struct MemoryDao {
    model: Arc<ModelDescriptor>,
    records: DashMap<String, Document>,
}

impl MemoryDao {
    pub fn new(model: Arc<ModelDescriptor>) -> Self {
        Self {
            model,
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching(&self, query: &Query) -> Vec<Document> {
        let mut rows: Vec<Document> = self
            .records
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            let ka = a.get("id").and_then(Value::as_str).unwrap_or_default();
            let kb = b.get("id").and_then(Value::as_str).unwrap_or_default();
            ka.cmp(kb)
        });
        rows
    }

    fn materialize(&self, doc: Document) -> Entity {
        Entity::from_document(doc, self.model.secured)
    }
}

#[async_trait]
impl Dao for MemoryDao {
    async fn connect(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn create(&self, entity: &Entity) -> StorageResult<String> {
        let doc = entity.to_document();
        let id = entity.id.clone();
        self.records.insert(id.clone(), doc);
        Ok(id)
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>> {
        Ok(self
            .records
            .get(id)
            .map(|entry| self.materialize(entry.value().clone())))
    }

    async fn find_one(&self, query: &Query) -> StorageResult<Option<Entity>> {
        Ok(self
            .matching(query)
            .into_iter()
            .next()
            .map(|doc| self.materialize(doc)))
    }

    async fn find(
        &self,
        query: &Query,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>> {
        let rows = self.matching(query);
        let iter = rows.into_iter().skip(skip as usize);
        let docs: Vec<Document> = match limit {
            Some(limit) => iter.take(limit as usize).collect(),
            None => iter.collect(),
        };
        Ok(docs.into_iter().map(|doc| self.materialize(doc)).collect())
    }

    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool> {
        let Some(existing) = self.records.get(id).map(|e| e.value().clone()) else {
            return Ok(false);
        };
        let mut entity = self.materialize(existing);
        entity.apply_patch(patch);
        self.records.insert(id.to_string(), entity.to_document());
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        Ok(self.matching(query).len() as u64)
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.records.contains_key(id))
    }

    async fn create_indexes(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn raw_read_query(&self, _query: &str, _params: &[Value]) -> StorageResult<Vec<Document>> {
        Err(StorageError::Query(
            "memory adapter has no native query language".into(),
        ))
    }

    async fn raw_write_query(&self, _query: &str, _params: &[Value]) -> StorageResult<u64> {
        Err(StorageError::Query(
            "memory adapter has no native query language".into(),
        ))
    }

    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        Ok(vec!["memory".to_string()])
    }

    async fn list_schemas(&self, _database: Option<&str>) -> StorageResult<Vec<String>> {
        Ok(vec!["default".to_string()])
    }

    async fn list_models(
        &self,
        _database: Option<&str>,
        _schema: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        Ok(vec![self.model.path.clone()])
    }

    async fn get_model_info(&self, path: &str) -> StorageResult<Document> {
        let mut info = Document::new();
        info.insert("name".into(), Value::String(path.to_string()));
        info.insert("type".into(), Value::String("memory".into()));
        info.insert("row_count".into(), Value::from(self.records.len() as u64));
        Ok(info)
    }

    async fn get_model_fields(&self, _path: &str) -> StorageResult<Vec<Document>> {
        Ok(self
            .model
            .fields
            .iter()
            .map(|spec| {
                let mut field = Document::new();
                field.insert("name".into(), Value::String(spec.name.clone()));
                field.insert(
                    "type".into(),
                    serde_json::to_value(spec.kind).unwrap_or(Value::Null),
                );
                field.insert("required".into(), Value::Bool(spec.required));
                field
            })
            .collect())
    }

    async fn get_model_indexes(&self, _path: &str) -> StorageResult<Vec<Document>> {
        Ok(self
            .model
            .indexes
            .iter()
            .map(|spec| {
                let mut index = Document::new();
                index.insert("field".into(), Value::String(spec.field.clone()));
                index.insert(
                    "type".into(),
                    serde_json::to_value(spec.kind).unwrap_or(Value::Null),
                );
                index
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnistore_model::storage::{StorageBinding, StorageKind};
    use serde_json::json;

    fn dao() -> MemoryDao {
        let model = Arc::new(
            ModelDescriptor::builder("Doc")
                .binding("file", StorageBinding::new(StorageKind::File))
                .build(),
        );
        MemoryDao::new(model)
    }

    fn fields(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let dao = dao();
        let entity = Entity::from_fields(fields(&[("title", json!("T")), ("n", json!(1))]));
        let id = dao.create(&entity).await.unwrap();

        let found = dao.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.field("title"), Some(&json!("T")));
        assert_eq!(found.id, entity.id);
        assert!(dao.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn update_merges_and_persists() {
        let dao = dao();
        let entity = Entity::from_fields(fields(&[("title", json!("old"))]));
        let id = dao.create(&entity).await.unwrap();

        let updated = dao
            .update(&id, &fields(&[("title", json!("new"))]))
            .await
            .unwrap();
        assert!(updated);
        let found = dao.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.field("title"), Some(&json!("new")));

        assert!(!dao.update("missing", &Document::new()).await.unwrap());
    }

    #[tokio::test]
    async fn find_applies_query_skip_and_limit() {
        let dao = dao();
        for i in 0..5 {
            let entity = Entity::from_fields(fields(&[("n", json!(i)), ("kept", json!(i % 2 == 0))]));
            dao.create(&entity).await.unwrap();
        }

        let q = Query::from_document(&fields(&[("kept", json!(true))])).unwrap();
        assert_eq!(dao.count(&q).await.unwrap(), 3);

        let page = dao.find(&q, Some(2), 1).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn delete_and_bulk_delete() {
        let dao = dao();
        let ids = dao
            .bulk_create(&[
                Entity::from_fields(fields(&[("n", json!(1))])),
                Entity::from_fields(fields(&[("n", json!(2))])),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        assert!(dao.delete(&ids[0]).await.unwrap());
        assert!(!dao.delete(&ids[0]).await.unwrap());
        assert_eq!(dao.bulk_delete(&ids).await.unwrap(), 1);
        assert!(dao.is_empty());
    }

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let dao = dao();
        let query = fields(&[("slug", json!("intro"))]);
        let defaults = fields(&[("title", json!("Intro"))]);

        let (first, created) = dao.find_or_create(&query, Some(&defaults)).await.unwrap();
        assert!(created);
        let (second, created) = dao.find_or_create(&query, Some(&defaults)).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn update_or_create_updates_existing() {
        let dao = dao();
        let query = fields(&[("slug", json!("intro"))]);
        let (_, created) = dao
            .update_or_create(&query, Some(&fields(&[("title", json!("v1"))])))
            .await
            .unwrap();
        assert!(created);

        let (entity, created) = dao
            .update_or_create(&query, Some(&fields(&[("title", json!("v2"))])))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(entity.field("title"), Some(&json!("v2")));
        assert_eq!(dao.len(), 1);
    }
}
