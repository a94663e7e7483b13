//! The relational DAO: typed columns, created and evolved on demand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::schema::{
    bootstrap_index_sqls, create_table_sql, infer_column_type, parse_timestamp, META_COLUMNS,
};
use omnistore_core::{StorageError, StorageResult};
use omnistore_dao::{ensure_valid_identifier, is_valid_identifier, Dao, Query};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::storage::{IndexKind, ModelDescriptor, StorageBinding};

/// DAO for PostgreSQL with dynamic table creation and schema evolution.
pub struct PostgresDao {
    model: Arc<ModelDescriptor>,
    binding: StorageBinding,
    pool: RwLock<Option<PgPool>>,
    table_ready: AtomicBool,
}

#[derive(Debug, Clone, PartialEq)]
enum PgBind {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    Timestamp(DateTime<Utc>),
}

/// Typed bind for a JSON value; `None` for nulls (the column stays NULL).
fn to_bind(value: &Value) -> Option<PgBind> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(PgBind::Bool(*b)),
        Value::Number(n) if n.is_i64() => Some(PgBind::Int(n.as_i64().unwrap_or(0))),
        Value::Number(n) => Some(PgBind::Float(n.as_f64().unwrap_or(0.0))),
        Value::String(s) => match parse_timestamp(s) {
            Some(ts) => Some(PgBind::Timestamp(ts)),
            None => Some(PgBind::Text(s.clone())),
        },
        other => Some(PgBind::Json(other.clone())),
    }
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    binds: &'q [PgBind],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for bind in binds {
        query = match bind {
            PgBind::Text(v) => query.bind(v),
            PgBind::Int(v) => query.bind(v),
            PgBind::Float(v) => query.bind(v),
            PgBind::Bool(v) => query.bind(v),
            PgBind::Json(v) => query.bind(v),
            PgBind::Timestamp(v) => query.bind(v),
        };
    }
    query
}

impl PostgresDao {
    pub fn new(model: Arc<ModelDescriptor>, binding: StorageBinding) -> Self {
        Self {
            model,
            binding,
            pool: RwLock::new(None),
            table_ready: AtomicBool::new(false),
        }
    }

    fn table(&self) -> StorageResult<&str> {
        ensure_valid_identifier(&self.model.path, "table")
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
            .ok_or_else(|| StorageError::Connection("relational pool unavailable".into()))
    }

    fn db_err(op: &str, e: sqlx::Error) -> StorageError {
        match &e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::Connection(format!("{op}: {e}"))
            }
            sqlx::Error::Database(db) if db.constraint().is_some() => {
                StorageError::Duplicate(format!("{op}: {db}"))
            }
            _ => StorageError::Query(format!("{op}: {e}")),
        }
    }

    async fn existing_columns(&self, pool: &PgPool) -> StorageResult<HashSet<String>> {
        let table = self.table()?;
        let rows = sqlx::query(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1 AND table_schema = 'public'",
        )
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| Self::db_err("column listing failed", e))?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("column_name").ok())
            .collect())
    }

    /// Create the table from the payload on first contact.
    async fn ensure_table(&self, pool: &PgPool, payload: &Document) -> StorageResult<()> {
        if self.table_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let table = self.table()?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(pool)
        .await
        .map_err(|e| Self::db_err("table probe failed", e))?;

        if !exists {
            let (sql, skipped) = create_table_sql(table, payload);
            for column in skipped {
                warn!(column = %column, "Skipping invalid column name");
            }
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| Self::db_err("table creation failed", e))?;
            info!(table = %table, "Created table with inferred schema");
            for statement in bootstrap_index_sqls(table, payload) {
                if let Err(e) = sqlx::query(&statement).execute(pool).await {
                    warn!(error = %e, "Failed to create bootstrap index");
                }
            }
        }
        self.table_ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Add columns the payload carries but the table does not.
    async fn add_missing_columns(
        &self,
        pool: &PgPool,
        payload: &Document,
        existing: &HashSet<String>,
    ) -> StorageResult<()> {
        let table = self.table()?;
        for (key, value) in payload {
            if existing.contains(key) || META_COLUMNS.contains(&key.as_str()) {
                continue;
            }
            if !is_valid_identifier(key) {
                warn!(column = %key, "Skipping invalid column name");
                continue;
            }
            let column_type = infer_column_type(value);
            let sql = format!("ALTER TABLE {table} ADD COLUMN {key} {column_type}");
            match sqlx::query(&sql).execute(pool).await {
                Ok(_) => info!(table = %table, column = %key, column_type, "Added column"),
                Err(e) => warn!(column = %key, error = %e, "Failed to add column"),
            }
        }
        Ok(())
    }

    /// Translate the uniform dialect to a WHERE clause over typed columns.
    fn build_where(&self, query: &Query, binds: &mut Vec<PgBind>) -> StorageResult<Option<String>> {
        let clause = match query {
            Query::All => None,
            Query::Eq(field, value) => self.comparison(field, value, "=", binds),
            Query::Ne(field, value) => self.comparison(field, value, "<>", binds),
            Query::Gt(field, value) => self.comparison(field, value, ">", binds),
            Query::Gte(field, value) => self.comparison(field, value, ">=", binds),
            Query::Lt(field, value) => self.comparison(field, value, "<", binds),
            Query::Lte(field, value) => self.comparison(field, value, "<=", binds),
            Query::In(field, values) => {
                if !is_valid_identifier(field) {
                    warn!(field = %field, "Skipping filter on unsafe field name");
                    None
                } else if values.is_empty() {
                    Some("FALSE".to_string())
                } else {
                    let mut placeholders = Vec::with_capacity(values.len());
                    for value in values {
                        match to_bind(value) {
                            Some(bind) => {
                                binds.push(bind);
                                placeholders.push(format!("${}", binds.len()));
                            }
                            None => placeholders.push("NULL".to_string()),
                        }
                    }
                    Some(format!("{field} IN ({})", placeholders.join(", ")))
                }
            }
            Query::Regex(field, pattern) => {
                if !is_valid_identifier(field) {
                    warn!(field = %field, "Skipping filter on unsafe field name");
                    None
                } else {
                    binds.push(PgBind::Text(pattern.clone()));
                    Some(format!("{field}::text ~ ${}", binds.len()))
                }
            }
            Query::And(parts) => self.joined(parts, " AND ", binds)?,
            Query::Or(parts) => self.joined(parts, " OR ", binds)?,
        };
        Ok(clause)
    }

    fn comparison(
        &self,
        field: &str,
        value: &Value,
        op: &str,
        binds: &mut Vec<PgBind>,
    ) -> Option<String> {
        if !is_valid_identifier(field) {
            warn!(field = %field, "Skipping filter on unsafe field name");
            return None;
        }
        match to_bind(value) {
            Some(bind) => {
                binds.push(bind);
                Some(format!("{field} {op} ${}", binds.len()))
            }
            None => Some(match op {
                "<>" => format!("{field} IS NOT NULL"),
                _ => format!("{field} IS NULL"),
            }),
        }
    }

    fn joined(
        &self,
        parts: &[Query],
        separator: &str,
        binds: &mut Vec<PgBind>,
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

    fn materialize(&self, row: &PgRow) -> Entity {
        Entity::from_document(row_to_document(row), self.model.secured)
    }
}

#[async_trait]
impl Dao for PostgresDao {
    async fn connect(&self) -> StorageResult<()> {
        let mut guard = self.pool.write().await;
        if guard.is_none() {
            let dsn = self.binding.render_connection_string();
            let mut options = PgPoolOptions::new().min_connections(2).max_connections(20);
            if let Some(timeout) = self.binding.timeout_secs {
                options = options.acquire_timeout(Duration::from_secs(timeout));
            }
            let pool = options
                .connect(&dsn)
                .await
                .map_err(|e| StorageError::Connection(format!("relational store: {e}")))?;
            *guard = Some(pool);
            info!(host = %self.binding.host, table = %self.model.path, "Connected to relational store");
        }
        Ok(())
    }

    async fn disconnect(&self) -> StorageResult<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            self.table_ready.store(false, Ordering::Release);
            info!(table = %self.model.path, "Disconnected from relational store");
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
        let table = self.table()?;

        let mut doc = entity.to_document();
        doc.remove("created_at");
        doc.remove("updated_at");

        self.ensure_table(&pool, &doc).await?;
        let existing = self.existing_columns(&pool).await?;
        self.add_missing_columns(&pool, &doc, &existing).await?;

        // Legacy tables keep a catch-all `data` column; feed it an empty
        // object when the caller does not.
        if existing.contains("data") && !doc.contains_key("data") {
            doc.insert("data".into(), json!({}));
        }

        let mut columns: Vec<String> = Vec::with_capacity(doc.len() + 2);
        let mut binds: Vec<PgBind> = Vec::with_capacity(doc.len() + 2);
        for (key, value) in &doc {
            if !is_valid_identifier(key) {
                warn!(column = %key, "Skipping invalid column name");
                continue;
            }
            let Some(bind) = to_bind(value) else { continue };
            columns.push(key.clone());
            binds.push(bind);
        }
        columns.push("created_at".into());
        binds.push(PgBind::Timestamp(entity.created_at));
        columns.push("updated_at".into());
        binds.push(PgBind::Timestamp(entity.updated_at));

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|col| col.as_str() != "id" && col.as_str() != "updated_at")
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .collect();
        let update_clause = if updates.is_empty() {
            "updated_at = CURRENT_TIMESTAMP".to_string()
        } else {
            format!("{}, updated_at = CURRENT_TIMESTAMP", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT (id) DO UPDATE SET {update_clause} RETURNING id",
            columns.join(", "),
            placeholders.join(", "),
        );
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&pool)
            .await
            .map_err(|e| Self::db_err("create failed", e))?;
        let id: String = row
            .try_get("id")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        debug!(table = %table, id = %id, "Record upserted");
        Ok(id)
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!("SELECT * FROM {table} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| Self::db_err("find failed", e))?;
        Ok(row.map(|row| self.materialize(&row)))
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
        let clause = self
            .build_where(query, &mut binds)?
            .unwrap_or_else(|| "TRUE".to_string());
        let mut sql = format!("SELECT * FROM {table} WHERE {clause} ORDER BY created_at DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if skip > 0 {
            sql.push_str(&format!(" OFFSET {skip}"));
        }
        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("find failed", e))?;
        Ok(rows.iter().map(|row| self.materialize(row)).collect())
    }

    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool> {
        if patch.is_empty() {
            return self.exists(id).await;
        }
        let pool = self.pool().await?;
        let table = self.table()?;
        let existing = self.existing_columns(&pool).await?;
        self.add_missing_columns(&pool, patch, &existing).await?;

        let mut sets = Vec::with_capacity(patch.len() + 1);
        let mut binds: Vec<PgBind> = Vec::with_capacity(patch.len() + 1);
        for (key, value) in patch {
            if key == "id" || !is_valid_identifier(key) {
                continue;
            }
            match to_bind(value) {
                Some(bind) => {
                    binds.push(bind);
                    sets.push(format!("{key} = ${}", binds.len()));
                }
                None => sets.push(format!("{key} = NULL")),
            }
        }
        sets.push("updated_at = CURRENT_TIMESTAMP".to_string());
        binds.push(PgBind::Text(id.to_string()));
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ${}",
            sets.join(", "),
            binds.len(),
        );
        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("update failed", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&pool)
            .await
            .map_err(|e| Self::db_err("delete failed", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let mut binds = Vec::new();
        let clause = self
            .build_where(query, &mut binds)?
            .unwrap_or_else(|| "TRUE".to_string());
        let sql = format!("SELECT COUNT(*) AS count FROM {table} WHERE {clause}");
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&pool)
            .await
            .map_err(|e| Self::db_err("count failed", e))?;
        let count: i64 = row
            .try_get("count")
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let pool = self.pool().await?;
        let table = self.table()?;
        let sql = format!("SELECT 1 FROM {table} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| Self::db_err("exists failed", e))?;
        Ok(row.is_some())
    }

    async fn bulk_create(&self, entities: &[Entity]) -> StorageResult<Vec<String>> {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(self.create(entity).await?);
        }
        Ok(ids)
    }

    async fn create_indexes(&self) -> StorageResult<()> {
        let pool = self.pool().await?;
        let table = self.table()?;
        for index in &self.model.indexes {
            if !is_valid_identifier(&index.field) {
                warn!(field = %index.field, "Skipping index on unsafe field name");
                continue;
            }
            let field = &index.field;
            let sql = match index.kind {
                IndexKind::Gin => format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{field}_gin ON {table} USING gin ({field})"
                ),
                _ => format!("CREATE INDEX IF NOT EXISTS idx_{table}_{field} ON {table} ({field})"),
            };
            if let Err(e) = sqlx::query(&sql).execute(&pool).await {
                warn!(error = %e, "Failed to create index");
            }
        }
        Ok(())
    }

    async fn raw_read_query(&self, query: &str, params: &[Value]) -> StorageResult<Vec<Document>> {
        let pool = self.pool().await?;
        let binds: Vec<PgBind> = params.iter().filter_map(to_bind).collect();
        let rows = bind_all(sqlx::query(query), &binds)
            .fetch_all(&pool)
            .await
            .map_err(|e| Self::db_err("raw query failed", e))?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn raw_write_query(&self, query: &str, params: &[Value]) -> StorageResult<u64> {
        let pool = self.pool().await?;
        let binds: Vec<PgBind> = params.iter().filter_map(to_bind).collect();
        let result = bind_all(sqlx::query(query), &binds)
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
            "SELECT table_name, table_type FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1",
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
        if is_valid_identifier(path) {
            let count_sql = format!("SELECT COUNT(*) AS count FROM {path}");
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

/// Best-effort conversion of a row into a JSON document.
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
        } else if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
            Value::String(v.to_rfc3339())
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
    use omnistore_model::storage::StorageKind;
    use serde_json::json;

    fn dao() -> PostgresDao {
        let model = Arc::new(
            ModelDescriptor::builder("Event")
                .path("events")
                .binding("relational", StorageBinding::new(StorageKind::Relational))
                .build(),
        );
        PostgresDao::new(model, StorageBinding::new(StorageKind::Relational))
    }

    #[test]
    fn binds_are_typed() {
        assert_eq!(to_bind(&json!("x")), Some(PgBind::Text("x".into())));
        assert_eq!(to_bind(&json!(1)), Some(PgBind::Int(1)));
        assert_eq!(to_bind(&json!(2.5)), Some(PgBind::Float(2.5)));
        assert_eq!(to_bind(&json!(true)), Some(PgBind::Bool(true)));
        assert_eq!(to_bind(&Value::Null), None);
        assert!(matches!(
            to_bind(&json!("2024-05-01T10:00:00Z")),
            Some(PgBind::Timestamp(_))
        ));
        assert!(matches!(to_bind(&json!({"a": 1})), Some(PgBind::Json(_))));
    }

    #[test]
    fn where_clause_uses_plain_columns() {
        let dao = dao();
        let query = Query::And(vec![
            Query::eq("a", 1),
            Query::Gt("c".into(), json!(3)),
            Query::eq("deleted_at", Value::Null),
        ]);
        let mut binds = Vec::new();
        let clause = dao.build_where(&query, &mut binds).unwrap().unwrap();
        assert_eq!(clause, "(a = $1 AND c > $2 AND deleted_at IS NULL)");
        assert_eq!(binds, vec![PgBind::Int(1), PgBind::Int(3)]);
    }

    #[test]
    fn in_list_and_regex_translate() {
        let dao = dao();
        let mut binds = Vec::new();
        let clause = dao
            .build_where(
                &Query::In("status".into(), vec![json!("a"), json!("b")]),
                &mut binds,
            )
            .unwrap()
            .unwrap();
        assert_eq!(clause, "status IN ($1, $2)");

        let mut binds = Vec::new();
        let clause = dao
            .build_where(&Query::Regex("name".into(), "ev.*".into()), &mut binds)
            .unwrap()
            .unwrap();
        assert_eq!(clause, "name::text ~ $1");
    }

    #[test]
    fn unsafe_fields_are_dropped_from_filters() {
        let dao = dao();
        let mut binds = Vec::new();
        let clause = dao
            .build_where(&Query::eq("a;drop", 1), &mut binds)
            .unwrap();
        assert!(clause.is_none());
        assert!(binds.is_empty());
    }
}
