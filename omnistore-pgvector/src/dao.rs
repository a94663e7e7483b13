//! The vector DAO: JSONB documents beside an embedding column.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embedding::{document_text, Embedder, HashEmbedder};
use omnistore_core::{StorageError, StorageResult};
use omnistore_dao::{ensure_valid_identifier, is_valid_identifier, Dao, Query};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::storage::{IndexKind, ModelDescriptor, StorageBinding};

/// DAO for PostgreSQL with the vector extension.
pub struct PgVectorDao {
    model: Arc<ModelDescriptor>,
    binding: StorageBinding,
    pool: RwLock<Option<PgPool>>,
    embedder: Arc<dyn Embedder>,
}

/// A deferred bind value for a parameterized clause.
#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Json(Value),
    Num(f64),
    Bool(bool),
    Text(String),
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Json(value) => query.bind(value),
            Bind::Num(value) => query.bind(value),
            Bind::Bool(value) => query.bind(value),
            Bind::Text(value) => query.bind(value),
        };
    }
    query
}

impl PgVectorDao {
    pub fn new(model: Arc<ModelDescriptor>, binding: StorageBinding) -> Self {
        Self::with_embedder(model, binding, Arc::new(HashEmbedder::default()))
    }

    pub fn with_embedder(
        model: Arc<ModelDescriptor>,
        binding: StorageBinding,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            model,
            binding,
            pool: RwLock::new(None),
            embedder,
        }
    }

    fn table(&self) -> StorageResult<&str> {
        ensure_valid_identifier(&self.model.path, "table")
    }

    fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    async fn pool(&self) -> StorageResult<PgPool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }
        self.connect().await?;
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::Connection("vector store pool unavailable".into()))
    }

    fn db_err(op: &str, e: sqlx::Error) -> StorageError {
        match &e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::Connection(format!("{op}: {e}"))
            }
            sqlx::Error::RowNotFound => StorageError::NotFound(op.to_string()),
            _ => StorageError::Query(format!("{op}: {e}")),
        }
    }

    // ── SQL building ──────────────────────────────────────────────────────

    fn create_table_sql(table: &str, dimension: usize) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\n    id TEXT PRIMARY KEY,\n    data JSONB NOT NULL,\n    embedding vector({dimension}),\n    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n)"
        )
    }

    /// Index statements: ivfflat over the embedding, gin_trgm for declared
    /// fulltext fields, btree expression indexes otherwise.
    fn index_sqls(&self, table: &str) -> Vec<String> {
        let mut statements = vec![format!(
            "CREATE INDEX IF NOT EXISTS \"{table}_embedding_idx\" ON \"{table}\" USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)"
        )];
        for index in &self.model.indexes {
            if !is_valid_identifier(&index.field) {
                warn!(field = %index.field, "Skipping index on unsafe field name");
                continue;
            }
            let field = &index.field;
            let statement = match index.kind {
                IndexKind::Fulltext | IndexKind::Text => format!(
                    "CREATE INDEX IF NOT EXISTS \"{table}_{field}_gin_idx\" ON \"{table}\" USING gin ((data->'{field}') gin_trgm_ops)"
                ),
                _ => format!(
                    "CREATE INDEX IF NOT EXISTS \"{table}_{field}_idx\" ON \"{table}\" ((data->'{field}'))"
                ),
            };
            statements.push(statement);
        }
        statements
    }

    /// Translate the uniform dialect to a WHERE clause over `data`.
    ///
    /// Values are parameter-bound with `::numeric` / `::boolean` casts where
    /// needed; `NULL` matches with `IS NULL` and consumes no parameter slot.
    fn build_where(&self, query: &Query, binds: &mut Vec<Bind>) -> StorageResult<Option<String>> {
        let clause = match query {
            Query::All => None,
            Query::Eq(field, value) => self.equality(field, value, binds, false),
            Query::Ne(field, value) => self.equality(field, value, binds, true),
            Query::Gt(field, value) => self.ordering(field, value, ">", binds)?,
            Query::Gte(field, value) => self.ordering(field, value, ">=", binds)?,
            Query::Lt(field, value) => self.ordering(field, value, "<", binds)?,
            Query::Lte(field, value) => self.ordering(field, value, "<=", binds)?,
            Query::In(field, values) => {
                if !is_valid_identifier(field) {
                    self.skip_field(field);
                    None
                } else if values.is_empty() {
                    Some("FALSE".to_string())
                } else {
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|value| {
                            binds.push(Bind::Json(value.clone()));
                            format!("${}", binds.len())
                        })
                        .collect();
                    Some(format!(
                        "data->'{field}' IN ({})",
                        placeholders.join(", ")
                    ))
                }
            }
            Query::Regex(field, pattern) => {
                if !is_valid_identifier(field) {
                    self.skip_field(field);
                    None
                } else {
                    binds.push(Bind::Text(pattern.clone()));
                    Some(format!("data->>'{field}' ~ ${}", binds.len()))
                }
            }
            Query::And(parts) => self.joined(parts, " AND ", binds)?,
            Query::Or(parts) => self.joined(parts, " OR ", binds)?,
        };
        Ok(clause)
    }

    fn joined(
        &self,
        parts: &[Query],
        separator: &str,
        binds: &mut Vec<Bind>,
    ) -> StorageResult<Option<String>> {
        let mut clauses = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(clause) = self.build_where(part, binds)? {
                clauses.push(clause);
            }
        }
        Ok(match clauses.len() {
            0 => None,
            1 => Some(clauses.remove(0)),
            _ => Some(format!("({})", clauses.join(separator))),
        })
    }

    fn skip_field(&self, field: &str) {
        warn!(field = %field, "Skipping filter on unsafe field name");
    }

    fn equality(
        &self,
        field: &str,
        value: &Value,
        binds: &mut Vec<Bind>,
        negate: bool,
    ) -> Option<String> {
        if !is_valid_identifier(field) {
            self.skip_field(field);
            return None;
        }
        let clause = match value {
            Value::Null => {
                if negate {
                    format!("data->'{field}' IS NOT NULL")
                } else {
                    format!("data->'{field}' IS NULL")
                }
            }
            Value::Number(n) => {
                binds.push(Bind::Num(n.as_f64().unwrap_or(0.0)));
                let op = if negate { "<>" } else { "=" };
                format!("(data->'{field}')::numeric {op} ${}::numeric", binds.len())
            }
            Value::Bool(b) => {
                binds.push(Bind::Bool(*b));
                let op = if negate { "<>" } else { "=" };
                format!("(data->'{field}')::boolean {op} ${}", binds.len())
            }
            other => {
                binds.push(Bind::Json(other.clone()));
                let op = if negate { "<>" } else { "=" };
                format!("data->'{field}' {op} ${}", binds.len())
            }
        };
        Some(clause)
    }

    fn ordering(
        &self,
        field: &str,
        value: &Value,
        op: &str,
        binds: &mut Vec<Bind>,
    ) -> StorageResult<Option<String>> {
        if !is_valid_identifier(field) {
            self.skip_field(field);
            return Ok(None);
        }
        match value {
            Value::Number(n) => {
                binds.push(Bind::Num(n.as_f64().unwrap_or(0.0)));
                Ok(Some(format!(
                    "(data->'{field}')::numeric {op} ${}::numeric",
                    binds.len()
                )))
            }
            Value::String(s) => {
                binds.push(Bind::Text(s.clone()));
                Ok(Some(format!("data->>'{field}' {op} ${}", binds.len())))
            }
            other => Err(StorageError::Query(format!(
                "unsupported operand for {op}: {other}"
            ))),
        }
    }

    fn where_or_true(clause: Option<String>) -> String {
        clause.unwrap_or_else(|| "TRUE".to_string())
    }

    async fn generate_embedding(&self, doc: &Document) -> StorageResult<Vec<f32>> {
        let text = document_text(doc);
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension()]);
        }
        self.embedder.embed(&text).await
    }

    fn materialize(&self, data: Value) -> Option<Entity> {
        data.as_object()
            .map(|doc| Entity::from_document(doc.clone(), self.model.secured))
    }

    fn row_data(row: &PgRow) -> StorageResult<Value> {
        row.try_get::<Value, _>("data")
            .map_err(|e| StorageError::Query(format!("malformed data column: {e}")))
    }

    async fn upsert(&self, pool: &PgPool, entity: &Entity) -> StorageResult<String> {
        let table = self.table()?;
        let doc = entity.to_document();
        let embedding = self.generate_embedding(&doc).await?;
        let sql = format!(
            "INSERT INTO \"{table}\" (id, data, embedding) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET data = $2, embedding = $3, updated_at = CURRENT_TIMESTAMP"
        );
        sqlx::query(&sql)
            .bind(&entity.id)
            .bind(Value::Object(doc))
            .bind(pgvector::Vector::from(embedding))
            .execute(pool)
            .await
            .map_err(|e| Self::db_err("vector create failed", e))?;
        Ok(entity.id.clone())
    }

    // ── Vector search ─────────────────────────────────────────────────────

    /// Rank records by cosine distance to `query_vec`.
    pub async fn vector_search(
        &self,
        query_vec: Vec<f32>,
        limit: u64,
    ) -> StorageResult<Vec<(Entity, f64)>> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!(
            "SELECT data, embedding <-> $1 AS distance FROM \"{table}\" ORDER BY embedding <-> $1 LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(pgvector::Vector::from(query_vec))
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("vector search failed", e))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let distance: f64 = row
                .try_get("distance")
                .map_err(|e| StorageError::Query(format!("missing distance column: {e}")))?;
            if let Some(entity) = self.materialize(Self::row_data(&row)?) {
                results.push((entity, distance));
            }
        }
        Ok(results)
    }

    /// Embed `text` and rank by similarity.
    pub async fn semantic_search(
        &self,
        text: &str,
        limit: u64,
    ) -> StorageResult<Vec<(Entity, f64)>> {
        let embedding = self.embedder.embed(text).await?;
        self.vector_search(embedding, limit).await
    }
}

#[async_trait]
impl Dao for PgVectorDao {
    async fn connect(&self) -> StorageResult<()> {
        {
            let mut guard = self.pool.write().await;
            if guard.is_none() {
                let dsn = self.binding.render_connection_string();
                let mut options = PgPoolOptions::new().min_connections(2).max_connections(10);
                if let Some(timeout) = self.binding.timeout_secs {
                    options = options.acquire_timeout(Duration::from_secs(timeout));
                }
                let pool = options
                    .connect(&dsn)
                    .await
                    .map_err(|e| StorageError::Connection(format!("vector store: {e}")))?;
                *guard = Some(pool);
                info!(host = %self.binding.host, collection = %self.model.path, "Connected to vector store");
            }
        }

        let pool = self.pool().await?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("vector extension unavailable", e))?;
        let table = self.table()?;
        sqlx::query(&Self::create_table_sql(table, self.dimension()))
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("table bootstrap failed", e))?;
        self.create_indexes().await
    }

    async fn disconnect(&self) -> StorageResult<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            info!(collection = %self.model.path, "Disconnected from vector store");
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.pool().await {
            Ok(pool) => sqlx::query("SELECT 1").execute(&pool).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn create(&self, entity: &Entity) -> StorageResult<String> {
        let pool = self.pool().await?;
        let id = self.upsert(&pool, entity).await?;
        debug!(collection = %self.model.path, id = %id, "Vector record upserted");
        Ok(id)
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!("SELECT data FROM \"{table}\" WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| Self::db_err("vector find failed", e))?;
        match row {
            Some(row) => Ok(self.materialize(Self::row_data(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_one(&self, query: &Query) -> StorageResult<Option<Entity>> {
        let results = self.find(query, Some(1), 0).await?;
        Ok(results.into_iter().next())
    }

    async fn find(
        &self,
        query: &Query,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let mut binds = Vec::new();
        let clause = Self::where_or_true(self.build_where(query, &mut binds)?);
        let mut sql =
            format!("SELECT data FROM \"{table}\" WHERE {clause} ORDER BY created_at DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if skip > 0 {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("vector find failed", e))?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(entity) = self.materialize(Self::row_data(&row)?) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool> {
        let Some(mut entity) = self.find_by_id(id).await? else {
            return Ok(false);
        };
        entity.apply_patch(patch);

        let pool = self.pool().await?;
        let table = self.table()?;
        let doc = entity.to_document();
        let embedding = self.generate_embedding(&doc).await?;
        let sql = format!(
            "UPDATE \"{table}\" SET data = $2, embedding = $3, updated_at = CURRENT_TIMESTAMP WHERE id = $1"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Value::Object(doc))
            .bind(pgvector::Vector::from(embedding))
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("vector update failed", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!("DELETE FROM \"{table}\" WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("vector delete failed", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let mut binds = Vec::new();
        let clause = Self::where_or_true(self.build_where(query, &mut binds)?);
        let sql = format!("SELECT COUNT(*) AS count FROM \"{table}\" WHERE {clause}");
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&pool)
            .await
            .map_err(|e| Self::db_err("vector count failed", e))?;
        let count: i64 = row
            .try_get("count")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!("SELECT 1 FROM \"{table}\" WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| Self::db_err("vector exists failed", e))?;
        Ok(row.is_some())
    }

    async fn bulk_create(&self, entities: &[Entity]) -> StorageResult<Vec<String>> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let doc = entity.to_document();
            let embedding = self.generate_embedding(&doc).await?;
            let sql = format!(
                "INSERT INTO \"{table}\" (id, data, embedding) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET data = $2, embedding = $3, updated_at = CURRENT_TIMESTAMP"
            );
            sqlx::query(&sql)
                .bind(&entity.id)
                .bind(Value::Object(doc))
                .bind(pgvector::Vector::from(embedding))
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::db_err("vector bulk create failed", e))?;
            ids.push(entity.id.clone());
        }
        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;
        Ok(ids)
    }

    async fn create_indexes(&self) -> StorageResult<()> {
        let pool = self.pool().await?;
        let table = self.table()?;
        for statement in self.index_sqls(table) {
            if let Err(e) = sqlx::query(&statement).execute(&pool).await {
                warn!(error = %e, "Failed to create vector index");
            }
        }
        Ok(())
    }

    async fn raw_read_query(&self, query: &str, params: &[Value]) -> StorageResult<Vec<Document>> {
        let pool = self.pool().await?;
        let rows = bind_values(sqlx::query(query), params)
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("raw query failed", e))?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn raw_write_query(&self, query: &str, params: &[Value]) -> StorageResult<u64> {
        let pool = self.pool().await?;
        let result = bind_values(sqlx::query(query), params)
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("raw write failed", e))?;
        Ok(result.rows_affected())
    }

    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT datname FROM pg_database WHERE datistemplate = false")
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("list databases failed", e))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("datname").ok())
            .collect())
    }

    async fn list_schemas(&self, _database: Option<&str>) -> StorageResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT schema_name FROM information_schema.schemata")
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("list schemas failed", e))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("schema_name").ok())
            .collect())
    }

    async fn list_models(
        &self,
        _database: Option<&str>,
        schema: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = $1",
        )
        .bind(schema.unwrap_or("public"))
        .fetch_all(&pool)
        .await
        .map_err(|e| Self::db_err("list models failed", e))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("table_name").ok())
            .collect())
    }

    async fn get_model_info(&self, path: &str) -> StorageResult<Document> {
        let pool = self.pool().await?;
        let row = sqlx::query(
            "SELECT table_name, table_type, is_insertable_into FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1",
        )
        .bind(path)
        .fetch_optional(&pool)
        .await
        .map_err(|e| Self::db_err("model info failed", e))?;

        let Some(row) = row else {
            return Ok(Document::new());
        };
        let mut info = Document::new();
        info.insert(
            "name".into(),
            Value::String(row.try_get("table_name").unwrap_or_default()),
        );
        info.insert(
            "type".into(),
            Value::String(row.try_get("table_type").unwrap_or_default()),
        );
        info.insert(
            "insertable".into(),
            Value::Bool(
                row.try_get::<String, _>("is_insertable_into")
                    .map(|v| v == "YES")
                    .unwrap_or(false),
            ),
        );
        if is_valid_identifier(path) {
            let count_sql = format!("SELECT COUNT(*) AS count FROM \"{path}\"");
            if let Ok(count_row) = sqlx::query(&count_sql).fetch_one(&pool).await {
                let count: i64 = count_row.try_get("count").unwrap_or(0);
                info.insert("row_count".into(), Value::from(count));
            }
        }
        Ok(info)
    }

    async fn get_model_fields(&self, path: &str) -> StorageResult<Vec<Document>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT column_name, data_type, is_nullable, column_default FROM information_schema.columns WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position",
        )
        .bind(path)
        .fetch_all(&pool)
        .await
        .map_err(|e| Self::db_err("model fields failed", e))?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut field = Document::new();
                field.insert(
                    "name".into(),
                    Value::String(row.try_get("column_name").unwrap_or_default()),
                );
                field.insert(
                    "type".into(),
                    Value::String(row.try_get("data_type").unwrap_or_default()),
                );
                field.insert(
                    "nullable".into(),
                    Value::Bool(
                        row.try_get::<String, _>("is_nullable")
                            .map(|v| v == "YES")
                            .unwrap_or(false),
                    ),
                );
                field.insert(
                    "default".into(),
                    row.try_get::<Option<String>, _>("column_default")
                        .ok()
                        .flatten()
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                );
                field
            })
            .collect())
    }

    async fn get_model_indexes(&self, path: &str) -> StorageResult<Vec<Document>> {
        let pool = self.pool().await?;
        let rows = sqlx::query("SELECT indexname, indexdef FROM pg_indexes WHERE tablename = $1")
            .bind(path)
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("model indexes failed", e))?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut index = Document::new();
                index.insert(
                    "name".into(),
                    Value::String(row.try_get("indexname").unwrap_or_default()),
                );
                index.insert(
                    "definition".into(),
                    Value::String(row.try_get("indexdef").unwrap_or_default()),
                );
                index
            })
            .collect())
    }
}

fn bind_values<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            Value::String(s) => query.bind(s),
            Value::Bool(b) => query.bind(b),
            Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or(0)),
            Value::Number(n) => query.bind(n.as_f64().unwrap_or(0.0)),
            other => query.bind(other),
        };
    }
    query
}

/// Best-effort conversion of an arbitrary row into a JSON document.
fn row_to_document(row: &PgRow) -> Document {
    use sqlx::Column;

    let mut doc = Document::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = if let Ok(Some(v)) = row.try_get::<Option<Value>, _>(index) {
            v
        } else if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(index) {
            Value::from(v)
        } else if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(index) {
            Value::from(v)
        } else if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(index) {
            Value::Bool(v)
        } else if let Ok(Some(v)) = row.try_get::<Option<String>, _>(index) {
            Value::String(v)
        } else {
            Value::Null
        };
        doc.insert(column.name().to_string(), value);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnistore_model::storage::{IndexSpec, StorageKind};
    use serde_json::json;

    fn dao() -> PgVectorDao {
        let model = Arc::new(
            ModelDescriptor::builder("Doc")
                .path("docs")
                .binding("vector", StorageBinding::new(StorageKind::Vector))
                .index(IndexSpec::new("content", IndexKind::Fulltext))
                .index(IndexSpec::new("author_id", IndexKind::Hash))
                .build(),
        );
        PgVectorDao::with_embedder(
            model,
            StorageBinding::new(StorageKind::Vector),
            Arc::new(HashEmbedder::new(4)),
        )
    }

    #[test]
    fn table_sql_carries_embedding_dimension() {
        let sql = PgVectorDao::create_table_sql("docs", 768);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"docs\""));
        assert!(sql.contains("embedding vector(768)"));
        assert!(sql.contains("data JSONB NOT NULL"));
    }

    #[test]
    fn index_sqls_map_declared_kinds() {
        let dao = dao();
        let statements = dao.index_sqls("docs");
        assert!(statements[0].contains("USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)"));
        assert!(statements
            .iter()
            .any(|s| s.contains("USING gin ((data->'content') gin_trgm_ops)")));
        assert!(statements
            .iter()
            .any(|s| s.contains("\"docs_author_id_idx\" ON \"docs\" ((data->'author_id'))")));
    }

    #[test]
    fn where_clause_casts_and_binds() {
        let dao = dao();
        let query = Query::And(vec![
            Query::eq("title", "T"),
            Query::eq("views", 3),
            Query::eq("published", true),
            Query::eq("deleted_at", Value::Null),
        ]);
        let mut binds = Vec::new();
        let clause = dao.build_where(&query, &mut binds).unwrap().unwrap();
        assert_eq!(
            clause,
            "(data->'title' = $1 AND (data->'views')::numeric = $2::numeric AND (data->'published')::boolean = $3 AND data->'deleted_at' IS NULL)"
        );
        assert_eq!(
            binds,
            vec![
                Bind::Json(json!("T")),
                Bind::Num(3.0),
                Bind::Bool(true),
            ]
        );
    }

    #[test]
    fn in_and_regex_translate() {
        let dao = dao();
        let mut binds = Vec::new();
        let clause = dao
            .build_where(
                &Query::In("role".into(), vec![json!("admin"), json!("staff")]),
                &mut binds,
            )
            .unwrap()
            .unwrap();
        assert_eq!(clause, "data->'role' IN ($1, $2)");

        let mut binds = Vec::new();
        let clause = dao
            .build_where(&Query::Regex("name".into(), "^a".into()), &mut binds)
            .unwrap()
            .unwrap();
        assert_eq!(clause, "data->>'name' ~ $1");
        assert_eq!(binds, vec![Bind::Text("^a".into())]);
    }

    #[test]
    fn unsafe_field_names_are_skipped() {
        let dao = dao();
        let mut binds = Vec::new();
        let clause = dao
            .build_where(&Query::eq("bad;name", "x"), &mut binds)
            .unwrap();
        assert!(clause.is_none());
        assert!(binds.is_empty());
    }

    #[test]
    fn or_branches_parenthesize() {
        let dao = dao();
        let query = Query::Or(vec![Query::eq("a", 1), Query::eq("b", 2)]);
        let mut binds = Vec::new();
        let clause = dao.build_where(&query, &mut binds).unwrap().unwrap();
        assert_eq!(
            clause,
            "((data->'a')::numeric = $1::numeric OR (data->'b')::numeric = $2::numeric)"
        );
    }

    #[tokio::test]
    async fn empty_document_embeds_to_zero_vector() {
        let dao = dao();
        let embedding = dao.generate_embedding(&Document::new()).await.unwrap();
        assert_eq!(embedding.len(), 4);
        assert!(embedding.iter().all(|v| *v == 0.0));
    }
}
