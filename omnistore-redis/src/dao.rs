//! The cache DAO: namespaced keys, metadata hashes, index sets.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use omnistore_core::{StorageError, StorageResult};
use omnistore_dao::{Dao, Query};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::storage::{ModelDescriptor, StorageBinding};

/// Default TTL for cache entries: 24 hours.
pub const DEFAULT_TTL_SECS: u64 = 86_400;

/// DAO for a Redis-style cache backend.
pub struct RedisDao {
    model: Arc<ModelDescriptor>,
    binding: StorageBinding,
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl RedisDao {
    pub fn new(model: Arc<ModelDescriptor>, binding: StorageBinding) -> Self {
        Self {
            model,
            binding,
            conn: RwLock::new(None),
        }
    }

    fn collection(&self) -> &str {
        &self.model.path
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{id}", self.collection())
    }

    fn meta_key(&self, id: &str) -> String {
        format!("{}:meta:{id}", self.collection())
    }

    fn index_key(&self, field: &str, value: &Value) -> String {
        format!(
            "{}:idx:{field}:{}",
            self.collection(),
            index_value(value)
        )
    }

    fn url(&self) -> String {
        let host = &self.binding.host;
        let port = self.binding.effective_port().unwrap_or(6379);
        let db = self.binding.database.as_deref().unwrap_or("0");
        match &self.binding.password {
            Some(password) => format!("redis://:{password}@{host}:{port}/{db}"),
            None => self.binding.render_connection_string(),
        }
    }

    async fn conn(&self) -> StorageResult<MultiplexedConnection> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }
        self.connect().await?;
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::Connection("cache connection unavailable".into()))
    }

    fn cache_err(op: &str, e: redis::RedisError) -> StorageError {
        if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() {
            StorageError::Connection(format!("{op}: {e}"))
        } else {
            StorageError::Query(format!("{op}: {e}"))
        }
    }

    fn ttl_of(doc: &Document) -> u64 {
        doc.get("_ttl").and_then(Value::as_u64).unwrap_or(DEFAULT_TTL_SECS)
    }

    fn index_fields(doc: &Document) -> Vec<String> {
        doc.get("_index_fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn store(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
        doc: &Document,
    ) -> StorageResult<()> {
        let serialized = serde_json::to_string(doc)
            .map_err(|e| StorageError::Validation(e.to_string()))?;
        let ttl = Self::ttl_of(doc);
        let key = self.key(id);
        if ttl > 0 {
            let _: () = redis::cmd("SETEX")
                .arg(&key)
                .arg(ttl)
                .arg(&serialized)
                .query_async(conn)
                .await
                .map_err(|e| Self::cache_err("cache write failed", e))?;
        } else {
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(&serialized)
                .query_async(conn)
                .await
                .map_err(|e| Self::cache_err("cache write failed", e))?;
        }

        let now = Utc::now().to_rfc3339();
        let _: () = redis::cmd("HSET")
            .arg(self.meta_key(id))
            .arg("created_at")
            .arg(doc.get("created_at").and_then(Value::as_str).unwrap_or(&now))
            .arg("updated_at")
            .arg(&now)
            .arg("ttl")
            .arg(ttl)
            .arg("size")
            .arg(serialized.len())
            .query_async(conn)
            .await
            .map_err(|e| Self::cache_err("cache metadata write failed", e))?;

        for field in Self::index_fields(doc) {
            if let Some(value) = doc.get(&field) {
                let _: () = redis::cmd("SADD")
                    .arg(self.index_key(&field, value))
                    .arg(id)
                    .query_async(conn)
                    .await
                    .map_err(|e| Self::cache_err("cache index write failed", e))?;
            }
        }
        debug!(collection = %self.collection(), id, ttl, "Cache entry stored");
        Ok(())
    }

    async fn read_doc(
        &self,
        conn: &mut MultiplexedConnection,
        id: &str,
    ) -> StorageResult<Option<Document>> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(id))
            .query_async(conn)
            .await
            .map_err(|e| Self::cache_err("cache read failed", e))?;
        let Some(raw) = raw else { return Ok(None) };
        let doc: Document = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Query(format!("corrupt cache entry {id}: {e}")))?;
        let _: () = redis::cmd("HSET")
            .arg(self.meta_key(id))
            .arg("last_accessed")
            .arg(Utc::now().to_rfc3339())
            .query_async(conn)
            .await
            .map_err(|e| Self::cache_err("cache metadata write failed", e))?;
        Ok(Some(doc))
    }

    /// All value keys of the collection, skipping meta and idx companions.
    async fn scan_collection(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> StorageResult<Vec<String>> {
        let pattern = format!("{}:*", self.collection());
        let meta_marker = format!("{}:meta:", self.collection());
        let idx_marker = format!("{}:idx:", self.collection());
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(conn)
                .await
                .map_err(|e| Self::cache_err("cache scan failed", e))?;
            for key in batch {
                if !key.starts_with(&meta_marker) && !key.starts_with(&idx_marker) {
                    keys.push(key);
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        Ok(keys)
    }

    /// Ids matching an equality filter set via index-set intersection.
    async fn ids_for_filters(
        &self,
        conn: &mut MultiplexedConnection,
        filters: &[(String, Value)],
    ) -> StorageResult<BTreeSet<String>> {
        let mut matching: BTreeSet<String> = BTreeSet::new();
        for (position, (field, value)) in filters.iter().enumerate() {
            let members: Vec<String> = redis::cmd("SMEMBERS")
                .arg(self.index_key(field, value))
                .query_async(conn)
                .await
                .map_err(|e| Self::cache_err("cache index read failed", e))?;
            let set: BTreeSet<String> = members.into_iter().collect();
            if position == 0 {
                matching = set;
            } else {
                matching = matching.intersection(&set).cloned().collect();
            }
            if matching.is_empty() {
                break;
            }
        }
        Ok(matching)
    }

    /// Flatten a query into equality filters when it is an (AND-ed) set of
    /// them; such queries run on the index sets.
    fn equality_filters(query: &Query) -> Option<Vec<(String, Value)>> {
        match query {
            Query::All => Some(Vec::new()),
            Query::Eq(field, value) => Some(vec![(field.clone(), value.clone())]),
            Query::And(parts) => {
                let mut filters = Vec::with_capacity(parts.len());
                for part in parts {
                    filters.extend(Self::equality_filters(part)?);
                }
                Some(filters)
            }
            _ => None,
        }
    }

    async fn matching_docs(&self, query: &Query) -> StorageResult<Vec<Document>> {
        let mut conn = self.conn().await?;
        let mut docs = Vec::new();
        match Self::equality_filters(query) {
            Some(filters) if !filters.is_empty() => {
                for id in self.ids_for_filters(&mut conn, &filters).await? {
                    if let Some(doc) = self.read_doc(&mut conn, &id).await? {
                        docs.push(doc);
                    }
                }
            }
            _ => {
                // No usable index sets; scan the collection and evaluate the
                // query in-process.
                for key in self.scan_collection(&mut conn).await? {
                    let raw: Option<String> = redis::cmd("GET")
                        .arg(&key)
                        .query_async(&mut conn)
                        .await
                        .map_err(|e| Self::cache_err("cache read failed", e))?;
                    if let Some(raw) = raw {
                        if let Ok(doc) = serde_json::from_str::<Document>(&raw) {
                            if query.matches(&doc) {
                                docs.push(doc);
                            }
                        }
                    }
                }
            }
        }
        Ok(docs)
    }

    fn materialize(&self, doc: Document) -> Entity {
        Entity::from_document(doc, self.model.secured)
    }

    // ── TTL operations ────────────────────────────────────────────────────

    /// Set a fresh TTL on an entry.
    pub async fn expire(&self, id: &str, ttl_secs: u64) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(self.key(id))
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("cache expire failed", e))?;
        if applied > 0 {
            let _: () = redis::cmd("HSET")
                .arg(self.meta_key(id))
                .arg("ttl")
                .arg(ttl_secs)
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::cache_err("cache metadata write failed", e))?;
            debug!(collection = %self.collection(), id, ttl_secs, "Cache TTL set");
        }
        Ok(applied > 0)
    }

    /// Reset an entry's TTL to the value stored in its metadata.
    pub async fn touch(&self, id: &str) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let ttl: Option<String> = redis::cmd("HGET")
            .arg(self.meta_key(id))
            .arg("ttl")
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("cache metadata read failed", e))?;
        let Some(ttl) = ttl.and_then(|t| t.parse::<u64>().ok()) else {
            return Ok(false);
        };
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(self.key(id))
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("cache expire failed", e))?;
        if applied > 0 {
            let _: () = redis::cmd("HSET")
                .arg(self.meta_key(id))
                .arg("last_touched")
                .arg(Utc::now().to_rfc3339())
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::cache_err("cache metadata write failed", e))?;
        }
        Ok(applied > 0)
    }

    /// The metadata hash of an entry.
    pub async fn get_metadata(&self, id: &str) -> StorageResult<Option<Document>> {
        let mut conn = self.conn().await?;
        let pairs: Vec<(String, String)> = redis::cmd("HGETALL")
            .arg(self.meta_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("cache metadata read failed", e))?;
        if pairs.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ))
    }

    /// Remove every key of the collection; returns how many went away.
    pub async fn clear_collection(&self) -> StorageResult<u64> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}:*", self.collection());
        let mut deleted = 0u64;
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::cache_err("cache scan failed", e))?;
            if !batch.is_empty() {
                let mut del = redis::cmd("DEL");
                for key in &batch {
                    del.arg(key);
                }
                let count: u64 = del
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| Self::cache_err("cache delete failed", e))?;
                deleted += count;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        info!(collection = %self.collection(), deleted, "Cleared cache collection");
        Ok(deleted)
    }
}

fn index_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Dao for RedisDao {
    async fn connect(&self) -> StorageResult<()> {
        let mut guard = self.conn.write().await;
        if guard.is_none() {
            let url = self.url();
            let client = redis::Client::open(url.as_str())
                .map_err(|e| StorageError::Connection(format!("cache: {e}")))?;
            let mut conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| StorageError::Connection(format!("cache: {e}")))?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Connection(format!("cache: {e}")))?;
            *guard = Some(conn);
            info!(host = %self.binding.host, collection = %self.collection(), "Connected to cache");
        }
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        if self.conn.write().await.take().is_some() {
            info!(collection = %self.collection(), "Disconnected from cache");
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.conn().await {
            Ok(mut conn) => {
                let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                pong.is_ok()
            }
            Err(_) => false,
        }
    }

    async fn create(&self, entity: &Entity) -> StorageResult<String> {
        let mut conn = self.conn().await?;
        let doc = entity.to_document();
        self.store(&mut conn, &entity.id, &doc).await?;
        Ok(entity.id.clone())
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>> {
        let mut conn = self.conn().await?;
        Ok(self
            .read_doc(&mut conn, id)
            .await?
            .map(|doc| self.materialize(doc)))
    }

    async fn find_one(&self, query: &Query) -> StorageResult<Option<Entity>> {
        let docs = self.matching_docs(query).await?;
        Ok(docs.into_iter().next().map(|doc| self.materialize(doc)))
    }

    async fn find(
        &self,
        query: &Query,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>> {
        let docs = self.matching_docs(query).await?;
        let iter = docs.into_iter().skip(skip as usize);
        let docs: Vec<Document> = match limit {
            Some(limit) => iter.take(limit as usize).collect(),
            None => iter.collect(),
        };
        Ok(docs.into_iter().map(|doc| self.materialize(doc)).collect())
    }

    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let Some(existing) = self.read_doc(&mut conn, id).await? else {
            return Ok(false);
        };
        let mut entity = self.materialize(existing);
        entity.apply_patch(patch);
        let mut doc = entity.to_document();
        if let Some(ttl) = patch.get("_ttl") {
            doc.insert("_ttl".into(), ttl.clone());
        }
        self.store(&mut conn, id, &doc).await?;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = redis::cmd("DEL")
            .arg(self.key(id))
            .arg(self.meta_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("cache delete failed", e))?;

        // Drop the id from every index set of the collection.
        let pattern = format!("{}:idx:*", self.collection());
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::cache_err("cache scan failed", e))?;
            for key in batch {
                let _: i64 = redis::cmd("SREM")
                    .arg(&key)
                    .arg(id)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| Self::cache_err("cache index cleanup failed", e))?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(deleted > 0)
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        match Self::equality_filters(query) {
            Some(filters) if !filters.is_empty() => {
                let mut conn = self.conn().await?;
                Ok(self.ids_for_filters(&mut conn, &filters).await?.len() as u64)
            }
            Some(_) => {
                let mut conn = self.conn().await?;
                Ok(self.scan_collection(&mut conn).await?.len() as u64)
            }
            None => Ok(self.matching_docs(query).await?.len() as u64),
        }
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let mut conn = self.conn().await?;
        let found: i64 = redis::cmd("EXISTS")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("cache exists failed", e))?;
        Ok(found > 0)
    }

    async fn create_indexes(&self) -> StorageResult<()> {
        // Index sets are maintained on write via `_index_fields`.
        Ok(())
    }

    /// Raw command execution: the query is the command name, parameters are
    /// appended as arguments.
    async fn raw_read_query(&self, query: &str, params: &[Value]) -> StorageResult<Vec<Document>> {
        let mut conn = self.conn().await?;
        let mut parts = query.split_whitespace();
        let Some(command) = parts.next() else {
            return Err(StorageError::Query("empty cache command".into()));
        };
        let mut cmd = redis::cmd(command);
        for part in parts {
            cmd.arg(part);
        }
        for param in params {
            cmd.arg(index_value(param));
        }
        let result: redis::Value = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_err("raw cache command failed", e))?;
        let mut doc = Document::new();
        doc.insert("result".into(), redis_to_json(result));
        Ok(vec![doc])
    }

    async fn raw_write_query(&self, query: &str, params: &[Value]) -> StorageResult<u64> {
        let rows = self.raw_read_query(query, params).await?;
        Ok(rows
            .first()
            .and_then(|doc| doc.get("result"))
            .and_then(Value::as_u64)
            .unwrap_or(1))
    }

    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        Ok(vec![self
            .binding
            .database
            .clone()
            .unwrap_or_else(|| "0".to_string())])
    }

    async fn list_schemas(&self, _database: Option<&str>) -> StorageResult<Vec<String>> {
        Ok(vec!["default".to_string()])
    }

    async fn list_models(
        &self,
        _database: Option<&str>,
        _schema: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        Ok(vec![self.collection().to_string()])
    }

    async fn get_model_info(&self, path: &str) -> StorageResult<Document> {
        let mut conn = self.conn().await?;
        let count = self.scan_collection(&mut conn).await?.len();
        let mut info = Document::new();
        info.insert("name".into(), Value::String(path.to_string()));
        info.insert("type".into(), Value::String("cache".into()));
        info.insert("row_count".into(), Value::from(count as u64));
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

fn redis_to_json(value: redis::Value) -> Value {
    match value {
        redis::Value::Nil => Value::Null,
        redis::Value::Int(i) => Value::from(i),
        redis::Value::SimpleString(s) => Value::String(s),
        redis::Value::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(_) => Value::Null,
        },
        redis::Value::Array(items) => {
            Value::Array(items.into_iter().map(redis_to_json).collect())
        }
        redis::Value::Okay => Value::String("OK".into()),
        other => Value::String(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnistore_model::storage::StorageKind;
    use serde_json::json;

    fn dao() -> RedisDao {
        let model = Arc::new(
            ModelDescriptor::builder("Doc")
                .path("docs")
                .binding("cache", StorageBinding::new(StorageKind::Cache))
                .build(),
        );
        RedisDao::new(model, StorageBinding::new(StorageKind::Cache))
    }

    #[test]
    fn keys_are_namespaced() {
        let dao = dao();
        assert_eq!(dao.key("42"), "docs:42");
        assert_eq!(dao.meta_key("42"), "docs:meta:42");
        assert_eq!(dao.index_key("author", &json!("u1")), "docs:idx:author:u1");
        assert_eq!(dao.index_key("stars", &json!(5)), "docs:idx:stars:5");
    }

    #[test]
    fn ttl_defaults_and_overrides() {
        let mut doc = Document::new();
        assert_eq!(RedisDao::ttl_of(&doc), DEFAULT_TTL_SECS);
        doc.insert("_ttl".into(), json!(60));
        assert_eq!(RedisDao::ttl_of(&doc), 60);
        doc.insert("_ttl".into(), json!(0));
        assert_eq!(RedisDao::ttl_of(&doc), 0);
    }

    #[test]
    fn index_fields_come_from_marker_key() {
        let mut doc = Document::new();
        assert!(RedisDao::index_fields(&doc).is_empty());
        doc.insert("_index_fields".into(), json!(["author_id", "status"]));
        assert_eq!(
            RedisDao::index_fields(&doc),
            vec!["author_id".to_string(), "status".to_string()]
        );
    }

    #[test]
    fn equality_filters_flatten_and_reject() {
        assert_eq!(RedisDao::equality_filters(&Query::All), Some(Vec::new()));
        let filters =
            RedisDao::equality_filters(&Query::And(vec![Query::eq("a", 1), Query::eq("b", "x")]))
                .unwrap();
        assert_eq!(filters.len(), 2);
        assert!(RedisDao::equality_filters(&Query::Gt("a".into(), json!(1))).is_none());
        assert!(RedisDao::equality_filters(&Query::Or(vec![Query::eq("a", 1)])).is_none());
    }

    #[test]
    fn password_lands_in_url() {
        let model = Arc::new(
            ModelDescriptor::builder("Doc")
                .binding("cache", StorageBinding::new(StorageKind::Cache))
                .build(),
        );
        let binding = StorageBinding::new(StorageKind::Cache).credentials("default", "secret");
        let dao = RedisDao::new(model, binding);
        assert_eq!(dao.url(), "redis://:secret@localhost:6379/0");
    }
}
