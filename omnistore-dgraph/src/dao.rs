//! The graph DAO: schema synthesis, prefixed predicates, DQL building.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::client::DgraphClient;
use crate::proto;
use omnistore_core::{StorageError, StorageResult};
use omnistore_dao::{is_valid_identifier, Dao, Query};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::storage::{FieldKind, IndexKind, ModelDescriptor, StorageBinding};

/// DAO implementation for a Dgraph-style graph store.
pub struct DgraphDao {
    model: Arc<ModelDescriptor>,
    binding: StorageBinding,
    client: RwLock<Option<DgraphClient>>,
}

impl DgraphDao {
    pub fn new(model: Arc<ModelDescriptor>, binding: StorageBinding) -> Self {
        Self {
            model,
            binding,
            client: RwLock::new(None),
        }
    }

    fn collection(&self) -> &str {
        &self.model.path
    }

    pub(crate) fn model_ref(&self) -> &ModelDescriptor {
        &self.model
    }

    fn predicate(&self, field: &str) -> String {
        format!("{}.{}", self.collection(), field)
    }

    pub(crate) async fn client(&self) -> StorageResult<DgraphClient> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }
        self.connect().await?;
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::Connection("graph client unavailable".into()))
    }

    // ── Schema ────────────────────────────────────────────────────────────

    fn tokenizer(kind: IndexKind) -> &'static str {
        match kind {
            IndexKind::Text | IndexKind::Fulltext => "fulltext",
            IndexKind::Hash
            | IndexKind::Exact
            | IndexKind::Gin
            | IndexKind::Btree
            | IndexKind::Vector => "exact",
        }
    }

    fn dgraph_type(kind: FieldKind) -> &'static str {
        match kind {
            FieldKind::String => "string",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::DateTime => "datetime",
            FieldKind::StringList => "[string]",
            // Maps and nested values ride as JSON strings.
            FieldKind::Json => "string",
        }
    }

    /// Synthesize the type schema from the model metadata.
    ///
    /// `id` is always indexed `exact`; boolean predicates are never indexed.
    pub fn render_schema(&self) -> String {
        let collection = self.collection();
        let mut parts = Vec::new();
        let mut members = vec![self.predicate("id")];
        parts.push(format!("{}: string @index(exact) .", self.predicate("id")));

        let mut builtin: Vec<(String, &'static str)> = vec![
            ("created_at".into(), "datetime"),
            ("updated_at".into(), "datetime"),
        ];
        if self.model.secured {
            builtin.extend([
                ("owner_id".into(), "string"),
                ("created_by".into(), "string"),
                ("modified_by".into(), "string"),
                ("acl".into(), "string"),
                ("auth_rules".into(), "string"),
            ]);
        }
        for (name, dgraph_type) in builtin {
            parts.push(format!("{}: {dgraph_type} .", self.predicate(&name)));
            members.push(self.predicate(&name));
        }

        for field in &self.model.fields {
            if field.name == "id" {
                continue;
            }
            let dgraph_type = Self::dgraph_type(field.kind);
            let line = match self.model.index_for(&field.name) {
                Some(index) if dgraph_type != "bool" => format!(
                    "{}: {dgraph_type} @index({}) .",
                    self.predicate(&field.name),
                    Self::tokenizer(index.kind)
                ),
                _ => format!("{}: {dgraph_type} .", self.predicate(&field.name)),
            };
            parts.push(line);
            members.push(self.predicate(&field.name));
        }

        let type_def = format!(
            "type {collection} {{\n  {}\n}}",
            members.join("\n  ")
        );
        format!("{}\n\n{}", parts.join("\n"), type_def)
    }

    /// Apply the schema; alter failures are logged, not fatal, since the schema
    /// may already match.
    async fn ensure_schema(&self) -> StorageResult<()> {
        let schema = self.render_schema();
        let mut client = self.client().await?;
        match client
            .alter(proto::Operation {
                schema,
                ..proto::Operation::default()
            })
            .await
        {
            Ok(_) => info!(collection = %self.collection(), "Graph schema applied"),
            Err(status) => {
                error!(collection = %self.collection(), %status, "Failed to apply graph schema")
            }
        }
        Ok(())
    }

    // ── Wire helpers ──────────────────────────────────────────────────────

    fn status_err(op: &str, status: tonic::Status) -> StorageError {
        match status.code() {
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => {
                StorageError::Connection(format!("{op}: {status}"))
            }
            _ => StorageError::Query(format!("{op}: {status}")),
        }
    }

    pub(crate) async fn run_read(
        &self,
        query: String,
        vars: HashMap<String, String>,
    ) -> StorageResult<Value> {
        let mut client = self.client().await?;
        let response = client
            .query(proto::Request {
                query,
                vars,
                read_only: true,
                ..proto::Request::default()
            })
            .await
            .map_err(|status| Self::status_err("graph query failed", status))?;
        serde_json::from_slice(&response.json)
            .map_err(|e| StorageError::Query(format!("malformed graph response: {e}")))
    }

    pub(crate) async fn run_mutations(
        &self,
        mutations: Vec<proto::Mutation>,
    ) -> StorageResult<proto::Response> {
        let mut client = self.client().await?;
        client
            .query(proto::Request {
                mutations,
                commit_now: true,
                ..proto::Request::default()
            })
            .await
            .map_err(|status| Self::status_err("graph mutation failed", status))
    }

    // ── Format conversion ─────────────────────────────────────────────────

    /// Entity → prefixed predicate map with the type discriminator.
    ///
    /// List and map fields are serialized to JSON strings inside single
    /// predicates.
    pub fn to_graph_document(&self, entity: &Entity, blank: Option<&str>) -> Document {
        let mut out = Document::new();
        if let Some(blank) = blank {
            out.insert("uid".into(), Value::String(format!("_:{blank}")));
        }
        out.insert(
            "dgraph.type".into(),
            Value::String(self.collection().to_string()),
        );
        for (key, value) in entity.to_document() {
            let encoded = match &value {
                Value::Array(_) | Value::Object(_) => {
                    Value::String(serde_json::to_string(&value).unwrap_or_default())
                }
                _ => value,
            };
            out.insert(self.predicate(&key), encoded);
        }
        out
    }

    fn parse_json_field(value: Value) -> Value {
        let Value::String(text) = &value else {
            return value;
        };
        let trimmed = text.trim_start();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            return value;
        }
        match serde_json::from_str::<Value>(text) {
            // One level of double-encoding unwrap for values stored through
            // older writers.
            Ok(Value::String(inner))
                if inner.trim_start().starts_with('[') || inner.trim_start().starts_with('{') =>
            {
                serde_json::from_str(&inner).unwrap_or(Value::String(inner))
            }
            Ok(parsed) => parsed,
            Err(_) => value,
        }
    }

    /// Prefixed predicate map → entity. Reverse edges and the type
    /// discriminator are dropped; the node UID becomes `graph_id` on secured
    /// models.
    pub fn from_graph_document(&self, data: &Document) -> Option<Entity> {
        if data.is_empty() {
            return None;
        }
        let prefix = format!("{}.", self.collection());
        let mut clean = Document::new();
        let mut uid = None;
        for (key, value) in data {
            if key == "uid" {
                uid = value.as_str().map(String::from);
                continue;
            }
            if key == "dgraph.type" || key.starts_with('~') {
                continue;
            }
            if let Some(field) = key.strip_prefix(&prefix) {
                clean.insert(field.to_string(), Self::parse_json_field(value.clone()));
            } else {
                clean.insert(key.clone(), value.clone());
            }
        }
        if self.model.secured {
            if let Some(uid) = uid {
                clean.entry("graph_id".to_string())
                    .or_insert(Value::String(uid));
            }
        }
        Some(Entity::from_document(clean, self.model.secured))
    }

    // ── DQL building ──────────────────────────────────────────────────────

    fn is_uid(value: &str) -> bool {
        value.len() > 2
            && value.starts_with("0x")
            && value[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Render the uniform dialect as a DQL filter expression, binding values
    /// as query variables. Conditions on fields that are not plain
    /// identifiers are skipped with a warning (the engine filters those
    /// in-process).
    pub fn render_filter(
        &self,
        query: &Query,
        binder: &mut VarBinder,
    ) -> StorageResult<Option<String>> {
        let rendered = match query {
            Query::All => None,
            Query::Eq(field, value) => self.comparison("eq", field, value, binder),
            Query::Ne(field, value) => self
                .comparison("eq", field, value, binder)
                .map(|expr| format!("NOT {expr}")),
            Query::Gt(field, value) => self.comparison("gt", field, value, binder),
            Query::Gte(field, value) => self.comparison("ge", field, value, binder),
            Query::Lt(field, value) => self.comparison("lt", field, value, binder),
            Query::Lte(field, value) => self.comparison("le", field, value, binder),
            Query::In(field, values) => {
                let parts: Vec<String> = values
                    .iter()
                    .filter_map(|value| self.comparison("eq", field, value, binder))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(format!("({})", parts.join(" OR ")))
                }
            }
            Query::Regex(field, pattern) => {
                if !is_valid_identifier(field) {
                    warn!(field = %field, "Skipping filter on non-predicate field");
                    None
                } else if pattern.contains('/') || pattern.contains('"') {
                    return Err(StorageError::Validation(format!(
                        "unsupported regex pattern for graph filter: {pattern}"
                    )));
                } else {
                    Some(format!("regexp({}, /{pattern}/)", self.predicate(field)))
                }
            }
            Query::And(parts) => join_filters(self.render_branches(parts, binder)?, " AND "),
            Query::Or(parts) => join_filters(self.render_branches(parts, binder)?, " OR "),
        };
        Ok(rendered)
    }

    fn render_branches(
        &self,
        parts: &[Query],
        binder: &mut VarBinder,
    ) -> StorageResult<Vec<String>> {
        let mut rendered = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(expr) = self.render_filter(part, binder)? {
                rendered.push(expr);
            }
        }
        Ok(rendered)
    }

    fn comparison(
        &self,
        op: &str,
        field: &str,
        value: &Value,
        binder: &mut VarBinder,
    ) -> Option<String> {
        if !is_valid_identifier(field) {
            warn!(field = %field, "Skipping filter on non-predicate field");
            return None;
        }
        let var = binder.bind(value);
        Some(format!("{op}({}, {var})", self.predicate(field)))
    }

    fn items_query(
        &self,
        query: &Query,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<(String, HashMap<String, String>)> {
        let mut binder = VarBinder::default();
        let filter = self.render_filter(query, &mut binder)?;
        let mut pagination = String::new();
        if skip > 0 {
            pagination.push_str(&format!(", offset: {skip}"));
        }
        if let Some(limit) = limit {
            pagination.push_str(&format!(", first: {limit}"));
        }
        let filter = filter
            .map(|expr| format!(" @filter({expr})"))
            .unwrap_or_default();
        let body = format!(
            "items(func: type({collection}){pagination}){filter} {{\n  uid\n  expand(_all_) {{ uid expand(_all_) }}\n}}",
            collection = self.collection(),
        );
        Ok(binder.wrap("items", &body))
    }

    /// Look up the node UID for a stored id.
    pub(crate) async fn resolve_uid(&self, id: &str) -> StorageResult<Option<String>> {
        if Self::is_uid(id) {
            return Ok(Some(id.to_string()));
        }
        let query = format!(
            "query resolve($id: string) {{\n  item(func: eq({pred}, $id)) @filter(type({collection})) {{ uid }}\n}}",
            pred = self.predicate("id"),
            collection = self.collection(),
        );
        let vars = HashMap::from([("$id".to_string(), id.to_string())]);
        let data = self.run_read(query, vars).await?;
        Ok(data
            .get("item")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("uid"))
            .and_then(Value::as_str)
            .map(String::from))
    }

    fn first_result(data: &Value, key: &str) -> Option<Document> {
        data.get(key)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_object)
            .cloned()
    }
}

/// Accumulates DQL variable declarations and values.
#[derive(Debug, Default)]
pub struct VarBinder {
    decls: Vec<(String, &'static str)>,
    values: HashMap<String, String>,
}

impl VarBinder {
    /// Bind a value, returning its variable name.
    pub fn bind(&mut self, value: &Value) -> String {
        let name = format!("$v{}", self.decls.len() + 1);
        let (dql_type, rendered) = match value {
            Value::String(s) => ("string", s.clone()),
            Value::Bool(b) => ("bool", b.to_string()),
            Value::Number(n) if n.is_i64() || n.is_u64() => ("int", n.to_string()),
            Value::Number(n) => ("float", n.to_string()),
            other => ("string", other.to_string()),
        };
        self.decls.push((name.clone(), dql_type));
        self.values.insert(name.clone(), rendered);
        name
    }

    /// Wrap a query body with the variable header when needed.
    pub fn wrap(self, name: &str, body: &str) -> (String, HashMap<String, String>) {
        if self.decls.is_empty() {
            return (format!("{{\n{body}\n}}"), HashMap::new());
        }
        let decls: Vec<String> = self
            .decls
            .iter()
            .map(|(var, dql_type)| format!("{var}: {dql_type}"))
            .collect();
        (
            format!("query {name}({}) {{\n{body}\n}}", decls.join(", ")),
            self.values,
        )
    }
}

fn join_filters(parts: Vec<String>, separator: &str) -> Option<String> {
    if parts.is_empty() {
        None
    } else if parts.len() == 1 {
        Some(parts.into_iter().next().unwrap())
    } else {
        Some(format!("({})", parts.join(separator)))
    }
}

#[async_trait]
impl Dao for DgraphDao {
    async fn connect(&self) -> StorageResult<()> {
        {
            let mut guard = self.client.write().await;
            if guard.is_none() {
                let target = self.binding.render_connection_string();
                let timeout = self.binding.timeout_secs.map(Duration::from_secs);
                let client = DgraphClient::connect(&target, timeout).await?;
                *guard = Some(client);
                info!(target = %target, collection = %self.collection(), "Connected to graph store");
            }
        }
        self.ensure_schema().await
    }

    async fn disconnect(&self) -> StorageResult<()> {
        let mut guard = self.client.write().await;
        if guard.take().is_some() {
            info!(collection = %self.collection(), "Disconnected from graph store");
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        let query = "{\n  probe(func: has(dgraph.type), first: 1) { uid }\n}".to_string();
        self.run_read(query, HashMap::new()).await.is_ok()
    }

    async fn create(&self, entity: &Entity) -> StorageResult<String> {
        let doc = self.to_graph_document(entity, Some("node"));
        let mutation = proto::Mutation {
            set_json: serde_json::to_vec(&doc)
                .map_err(|e| StorageError::Validation(e.to_string()))?,
            ..proto::Mutation::default()
        };
        let response = self.run_mutations(vec![mutation]).await?;
        let uid = response
            .uids
            .get("node")
            .cloned()
            .or_else(|| response.uids.values().next().cloned());
        debug!(collection = %self.collection(), id = %entity.id, uid = ?uid, "Graph node created");
        Ok(uid.unwrap_or_else(|| entity.id.clone()))
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Entity>> {
        let data = if Self::is_uid(id) {
            let query = format!(
                "{{\n  item(func: uid({id})) @filter(type({collection})) {{\n    uid\n    expand(_all_) {{ uid expand(_all_) }}\n  }}\n}}",
                collection = self.collection(),
            );
            self.run_read(query, HashMap::new()).await?
        } else {
            let query = format!(
                "query item($id: string) {{\n  item(func: eq({pred}, $id)) @filter(type({collection})) {{\n    uid\n    expand(_all_) {{ uid expand(_all_) }}\n  }}\n}}",
                pred = self.predicate("id"),
                collection = self.collection(),
            );
            let vars = HashMap::from([("$id".to_string(), id.to_string())]);
            self.run_read(query, vars).await?
        };
        Ok(Self::first_result(&data, "item")
            .as_ref()
            .and_then(|doc| self.from_graph_document(doc)))
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
        let (dql, vars) = self.items_query(query, limit, skip)?;
        let data = self.run_read(dql, vars).await?;
        let mut entities = Vec::new();
        if let Some(items) = data.get("items").and_then(Value::as_array) {
            for item in items {
                if let Some(doc) = item.as_object() {
                    if let Some(entity) = self.from_graph_document(doc) {
                        entities.push(entity);
                    }
                }
            }
        }
        Ok(entities)
    }

    async fn update(&self, id: &str, patch: &Document) -> StorageResult<bool> {
        let Some(uid) = self.resolve_uid(id).await? else {
            return Ok(false);
        };
        let mut mutations = Vec::new();
        for (key, value) in patch {
            if key == "id" || key == "uid" || key == "dgraph.type" {
                continue;
            }
            if !is_valid_identifier(key) {
                warn!(field = %key, "Skipping update of non-predicate field");
                continue;
            }
            let pred = self.predicate(key);
            let encoded = match value {
                Value::Array(_) | Value::Object(_) => {
                    Value::String(serde_json::to_string(value).unwrap_or_default())
                }
                other => other.clone(),
            };
            // Discard prior values first so scalar predicates never
            // accumulate; both mutations commit in one request.
            let mut discard = Map::new();
            discard.insert("uid".into(), Value::String(uid.clone()));
            discard.insert(pred.clone(), Value::Null);
            let mut assign = Map::new();
            assign.insert("uid".into(), Value::String(uid.clone()));
            assign.insert(pred, encoded);
            mutations.push(proto::Mutation {
                delete_json: serde_json::to_vec(&Value::Object(discard))
                    .map_err(|e| StorageError::Validation(e.to_string()))?,
                ..proto::Mutation::default()
            });
            mutations.push(proto::Mutation {
                set_json: serde_json::to_vec(&Value::Object(assign))
                    .map_err(|e| StorageError::Validation(e.to_string()))?,
                ..proto::Mutation::default()
            });
        }
        if mutations.is_empty() {
            return Ok(true);
        }
        self.run_mutations(mutations).await?;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StorageResult<bool> {
        let uid = if Self::is_uid(id) {
            id.to_string()
        } else {
            match self.resolve_uid(id).await? {
                Some(uid) => uid,
                None => return Ok(false),
            }
        };
        let mutations = vec![
            proto::Mutation {
                delete_json: serde_json::to_vec(&json!({ "uid": uid }))
                    .map_err(|e| StorageError::Validation(e.to_string()))?,
                ..proto::Mutation::default()
            },
            proto::Mutation {
                del_nquads: format!("<{uid}> * * .").into_bytes(),
                ..proto::Mutation::default()
            },
        ];
        self.run_mutations(mutations).await?;
        Ok(true)
    }

    async fn count(&self, query: &Query) -> StorageResult<u64> {
        let mut binder = VarBinder::default();
        let filter = self
            .render_filter(query, &mut binder)?
            .map(|expr| format!(" @filter({expr})"))
            .unwrap_or_default();
        let body = format!(
            "count(func: type({collection})){filter} {{\n  total: count(uid)\n}}",
            collection = self.collection(),
        );
        let (dql, vars) = binder.wrap("count", &body);
        let data = self.run_read(dql, vars).await?;
        Ok(data
            .get("count")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.resolve_uid(id).await?.is_some())
    }

    async fn bulk_create(&self, entities: &[Entity]) -> StorageResult<Vec<String>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let mut docs = Vec::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            docs.push(Value::Object(
                self.to_graph_document(entity, Some(&format!("node{index}"))),
            ));
        }
        let mutation = proto::Mutation {
            set_json: serde_json::to_vec(&Value::Array(docs))
                .map_err(|e| StorageError::Validation(e.to_string()))?,
            ..proto::Mutation::default()
        };
        let response = self.run_mutations(vec![mutation]).await?;
        Ok(entities
            .iter()
            .enumerate()
            .map(|(index, entity)| {
                response
                    .uids
                    .get(&format!("node{index}"))
                    .cloned()
                    .unwrap_or_else(|| entity.id.clone())
            })
            .collect())
    }

    async fn create_indexes(&self) -> StorageResult<()> {
        // Indexes are carried by the schema.
        self.ensure_schema().await
    }

    /// Raw DQL read. A single object parameter is passed as named query
    /// variables.
    async fn raw_read_query(&self, query: &str, params: &[Value]) -> StorageResult<Vec<Document>> {
        let mut vars = HashMap::new();
        if let Some(Value::Object(named)) = params.first() {
            for (key, value) in named {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                vars.insert(key.clone(), rendered);
            }
        }
        let data = self.run_read(query.to_string(), vars).await?;
        if let Some(root) = data.as_object() {
            for value in root.values() {
                if let Value::Array(items) = value {
                    return Ok(items
                        .iter()
                        .filter_map(Value::as_object)
                        .cloned()
                        .collect());
                }
            }
        }
        Ok(Vec::new())
    }

    /// Raw mutation in N-Quads form; returns the number of assigned UIDs.
    async fn raw_write_query(&self, query: &str, _params: &[Value]) -> StorageResult<u64> {
        let mutation = proto::Mutation {
            set_nquads: query.as_bytes().to_vec(),
            ..proto::Mutation::default()
        };
        let response = self.run_mutations(vec![mutation]).await?;
        Ok(response.uids.len() as u64)
    }

    async fn list_databases(&self) -> StorageResult<Vec<String>> {
        // The graph store partitions by namespace, not database.
        Ok(vec!["default".to_string()])
    }

    async fn list_schemas(&self, _database: Option<&str>) -> StorageResult<Vec<String>> {
        let query = "{\n  types(func: has(dgraph.type)) {\n    dgraph.type\n  }\n}".to_string();
        let data = self.run_read(query, HashMap::new()).await?;
        let mut names = std::collections::BTreeSet::new();
        if let Some(items) = data.get("types").and_then(Value::as_array) {
            for item in items {
                match item.get("dgraph.type") {
                    Some(Value::String(name)) => {
                        names.insert(name.clone());
                    }
                    Some(Value::Array(list)) => {
                        for name in list.iter().filter_map(Value::as_str) {
                            names.insert(name.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    async fn list_models(
        &self,
        database: Option<&str>,
        _schema: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.list_schemas(database).await
    }

    async fn get_model_info(&self, path: &str) -> StorageResult<Document> {
        let path = omnistore_dao::ensure_valid_identifier(path, "type")?;
        let query = format!("schema(type: {path}) {{}}");
        let data = self.run_read(query, HashMap::new()).await?;
        let mut info = Document::new();
        info.insert("name".into(), Value::String(path.to_string()));
        info.insert("type".into(), Value::String("graph_type".into()));
        info.insert(
            "fields".into(),
            data.get("types").cloned().unwrap_or(Value::Array(Vec::new())),
        );
        info.insert(
            "predicates".into(),
            data.get("schema")
                .cloned()
                .unwrap_or(Value::Array(Vec::new())),
        );
        Ok(info)
    }

    async fn get_model_fields(&self, path: &str) -> StorageResult<Vec<Document>> {
        let info = self.get_model_info(path).await?;
        Ok(info
            .get("predicates")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_model_indexes(&self, path: &str) -> StorageResult<Vec<Document>> {
        let fields = self.get_model_fields(path).await?;
        Ok(fields
            .into_iter()
            .filter(|field| field.get("index").and_then(Value::as_bool).unwrap_or(false))
            .map(|field| {
                let mut index = Document::new();
                index.insert(
                    "field".into(),
                    field.get("predicate").cloned().unwrap_or(Value::Null),
                );
                index.insert(
                    "type".into(),
                    field
                        .get("tokenizer")
                        .and_then(Value::as_array)
                        .and_then(|t| t.first().cloned())
                        .unwrap_or(Value::String("hash".into())),
                );
                index
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnistore_model::storage::{FieldSpec, IndexSpec, StorageKind};
    use serde_json::json;

    fn dao() -> DgraphDao {
        let model = Arc::new(
            ModelDescriptor::builder("Doc")
                .path("docs")
                .binding("graph", StorageBinding::new(StorageKind::Graph))
                .field(FieldSpec::new("title", FieldKind::String))
                .field(FieldSpec::new("content", FieldKind::String))
                .field(FieldSpec::new("published", FieldKind::Bool))
                .field(FieldSpec::new("tags", FieldKind::StringList))
                .index(IndexSpec::new("title", IndexKind::Text))
                .index(IndexSpec::new("content", IndexKind::Hash))
                .index(IndexSpec::new("published", IndexKind::Hash))
                .build(),
        );
        DgraphDao::new(model, StorageBinding::new(StorageKind::Graph))
    }

    #[test]
    fn schema_maps_index_kinds_and_skips_bools() {
        let schema = dao().render_schema();
        assert!(schema.contains("docs.id: string @index(exact) ."));
        assert!(schema.contains("docs.title: string @index(fulltext) ."));
        assert!(schema.contains("docs.content: string @index(exact) ."));
        // Boolean predicates are never indexed.
        assert!(schema.contains("docs.published: bool ."));
        assert!(schema.contains("docs.tags: [string] ."));
        assert!(schema.contains("type docs {"));
    }

    #[test]
    fn graph_document_prefixes_and_serializes_complex_fields() {
        let dao = dao();
        let mut entity = Entity::new();
        entity.set_field("title", json!("T"));
        entity.set_field("tags", json!(["a", "b"]));

        let doc = dao.to_graph_document(&entity, Some("node"));
        assert_eq!(doc.get("uid"), Some(&json!("_:node")));
        assert_eq!(doc.get("dgraph.type"), Some(&json!("docs")));
        assert_eq!(doc.get("docs.title"), Some(&json!("T")));
        assert_eq!(doc.get("docs.tags"), Some(&json!("[\"a\",\"b\"]")));
    }

    #[test]
    fn from_graph_document_unprefixes_and_parses_json_strings() {
        let dao = dao();
        let mut entity = Entity::new();
        entity.set_field("title", json!("T"));
        entity.set_field("tags", json!(["a", "b"]));
        let mut stored = dao.to_graph_document(&entity, None);
        stored.insert("uid".into(), json!("0x12"));
        stored.insert("~linked".into(), json!([{"uid": "0x99"}]));

        let back = dao.from_graph_document(&stored).unwrap();
        assert_eq!(back.id, entity.id);
        assert_eq!(back.field("title"), Some(&json!("T")));
        assert_eq!(back.field("tags"), Some(&json!(["a", "b"])));
        assert!(back.field("~linked").is_none());
    }

    #[test]
    fn double_encoded_json_strings_unwrap_once() {
        let parsed = DgraphDao::parse_json_field(json!("\"[1,2]\""));
        assert_eq!(parsed, json!([1, 2]));
        let untouched = DgraphDao::parse_json_field(json!("plain text"));
        assert_eq!(untouched, json!("plain text"));
    }

    #[test]
    fn filters_bind_values_as_variables() {
        let dao = dao();
        let query = Query::And(vec![
            Query::eq("title", "T"),
            Query::Gt("views".into(), json!(10)),
        ]);
        let mut binder = VarBinder::default();
        let filter = dao.render_filter(&query, &mut binder).unwrap().unwrap();
        assert_eq!(filter, "(eq(docs.title, $v1) AND gt(docs.views, $v2))");

        let (dql, vars) = binder.wrap("items", "items(func: type(docs)) { uid }");
        assert!(dql.starts_with("query items($v1: string, $v2: int)"));
        assert_eq!(vars.get("$v1"), Some(&"T".to_string()));
        assert_eq!(vars.get("$v2"), Some(&"10".to_string()));
    }

    #[test]
    fn in_filter_expands_to_or() {
        let dao = dao();
        let query = Query::In("title".into(), vec![json!("a"), json!("b")]);
        let mut binder = VarBinder::default();
        let filter = dao.render_filter(&query, &mut binder).unwrap().unwrap();
        assert_eq!(filter, "(eq(docs.title, $v1) OR eq(docs.title, $v2))");
    }

    #[test]
    fn dotted_fields_are_skipped_not_spliced() {
        let dao = dao();
        let query = Query::eq("acl.principal_id", "u1");
        let mut binder = VarBinder::default();
        assert!(dao.render_filter(&query, &mut binder).unwrap().is_none());
    }

    #[test]
    fn uid_shapes_are_recognized() {
        assert!(DgraphDao::is_uid("0x12af"));
        assert!(!DgraphDao::is_uid("0x"));
        assert!(!DgraphDao::is_uid("12af"));
        assert!(!DgraphDao::is_uid("0xzz"));
    }

    #[test]
    fn pagination_lands_inside_func() {
        let dao = dao();
        let (dql, _) = dao.items_query(&Query::All, Some(5), 10).unwrap();
        assert!(dql.contains("items(func: type(docs), offset: 10, first: 5)"));
    }
}
