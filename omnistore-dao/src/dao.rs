//! The contract every backend adapter implements.

use async_trait::async_trait;
use serde_json::Value;

use crate::query::Query;
use omnistore_core::StorageResult;
use omnistore_model::entity::{Document, Entity};

/// Abstract backend operations.
///
/// Adapters translate the uniform [`Query`] dialect to their native language,
/// validate identifiers they splice into query text, and wrap driver errors
/// into [`omnistore_core::StorageError`] before returning.
///
/// Bulk operations default to looping the singular forms; adapters with a
/// native batch path (transactions, multi-document mutations) override them.
#[async_trait]
pub trait Dao: Send + Sync {
    /// Establish the connection, creating schema/tables where the backend
    /// needs them. Idempotent.
    async fn connect(&self) -> StorageResult<()>;

    /// Tear down the connection.
    async fn disconnect(&self) -> StorageResult<()>;

    /// Probe the backend with a trivial operation.
    async fn test_connection(&self) -> bool;

    /// Insert a record, returning the backend-assigned id.
    async fn create(&self, entity: &Entity) -> StorageResult<String>;

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>>;

    async fn find_one(&self, query: &Query) -> StorageResult<Option<Entity>>;

    async fn find(
        &self,
        query: &Query,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>>;

    /// Patch a record; `false` when the id is absent.
    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool>;

    /// Delete a record; `false` when the id is absent.
    async fn delete(&self, id: &str) -> StorageResult<bool>;

    async fn count(&self, query: &Query) -> StorageResult<u64>;

    async fn exists(&self, id: &str) -> StorageResult<bool>;

    async fn bulk_create(&self, entities: &[Entity]) -> StorageResult<Vec<String>> {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(self.create(entity).await?);
        }
        Ok(ids)
    }

    /// Apply patches carrying their target `id`; returns how many matched.
    async fn bulk_update(&self, updates: &[Document]) -> StorageResult<u64> {
        let mut updated = 0;
        for patch in updates {
            let Some(id) = patch.get("id").and_then(Value::as_str) else {
                continue;
            };
            let mut rest = patch.clone();
            rest.remove("id");
            if self.update(id, &rest).await? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn bulk_delete(&self, ids: &[String]) -> StorageResult<u64> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Realize the indexes declared in the model metadata.
    async fn create_indexes(&self) -> StorageResult<()>;

    /// Run a native read query with positional parameters.
    async fn raw_read_query(&self, query: &str, params: &[Value]) -> StorageResult<Vec<Document>>;

    /// Run a native write query; returns affected records.
    async fn raw_write_query(&self, query: &str, params: &[Value]) -> StorageResult<u64>;

    async fn list_databases(&self) -> StorageResult<Vec<String>>;

    async fn list_schemas(&self, database: Option<&str>) -> StorageResult<Vec<String>>;

    async fn list_models(
        &self,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> StorageResult<Vec<String>>;

    async fn get_model_info(&self, path: &str) -> StorageResult<Document>;

    /// Schema description: fields plus indexes.
    async fn get_model_schema(&self, path: &str) -> StorageResult<Document> {
        let mut schema = Document::new();
        schema.insert(
            "fields".into(),
            Value::Array(
                self.get_model_fields(path)
                    .await?
                    .into_iter()
                    .map(Value::Object)
                    .collect(),
            ),
        );
        schema.insert(
            "indexes".into(),
            Value::Array(
                self.get_model_indexes(path)
                    .await?
                    .into_iter()
                    .map(Value::Object)
                    .collect(),
            ),
        );
        Ok(schema)
    }

    async fn get_model_fields(&self, path: &str) -> StorageResult<Vec<Document>>;

    async fn get_model_indexes(&self, path: &str) -> StorageResult<Vec<Document>>;

    /// Find a record matching the equality document, or create it from the
    /// query merged with `defaults`. Returns `(entity, created)`.
    async fn find_or_create(
        &self,
        query: &Document,
        defaults: Option<&Document>,
    ) -> StorageResult<(Entity, bool)> {
        let parsed = Query::from_document(query)?;
        if let Some(existing) = self.find_one(&parsed).await? {
            return Ok((existing, false));
        }

        let mut data = query.clone();
        if let Some(defaults) = defaults {
            for (k, v) in defaults {
                data.insert(k.clone(), v.clone());
            }
        }
        let mut entity = Entity::from_fields(data);
        let id = self.create(&entity).await?;
        entity.id = id;
        Ok((entity, true))
    }

    /// Update the record matching the equality document with `defaults`, or
    /// create it. Returns `(entity, created)`.
    async fn update_or_create(
        &self,
        query: &Document,
        defaults: Option<&Document>,
    ) -> StorageResult<(Entity, bool)> {
        let parsed = Query::from_document(query)?;
        if let Some(existing) = self.find_one(&parsed).await? {
            if let Some(defaults) = defaults {
                self.update(&existing.id, defaults).await?;
            }
            let refreshed = self
                .find_by_id(&existing.id)
                .await?
                .unwrap_or(existing);
            return Ok((refreshed, false));
        }

        let mut data = query.clone();
        if let Some(defaults) = defaults {
            for (k, v) in defaults {
                data.insert(k.clone(), v.clone());
            }
        }
        let mut entity = Entity::from_fields(data);
        let id = self.create(&entity).await?;
        entity.id = id;
        Ok((entity, true))
    }
}
