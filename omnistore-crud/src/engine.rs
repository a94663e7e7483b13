//! Cross-backend fan-out with security gating and an operations log.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::types::{StorageOperation, SyncStrategy};
use omnistore_core::{StorageError, StorageResult};
use omnistore_dao::{Dao, DaoFactory, Query};
use omnistore_model::entity::{Document, Entity};
use omnistore_model::security::{check_permission, AclEntry, Permission, SecurityContext};
use omnistore_model::sensitive::{render_mask, sanitize};
use omnistore_model::storage::{ModelDescriptor, StorageKind};

/// Unified CRUD operations for one model across all of its bindings.
pub struct UnifiedCrud {
    model: Arc<ModelDescriptor>,
    daos: Vec<(String, Arc<dyn Dao>)>,
    strategy: SyncStrategy,
    security_enabled: bool,
    ops_log: Mutex<Vec<StorageOperation>>,
    connected: tokio::sync::Mutex<HashSet<String>>,
}

impl UnifiedCrud {
    /// Build the engine, creating one adapter per binding via the factory.
    pub fn new(model: Arc<ModelDescriptor>, factory: &DaoFactory) -> StorageResult<Self> {
        let daos = factory.create_all(&model)?;
        Ok(Self::from_daos(model, daos))
    }

    /// Build the engine from pre-constructed adapters (declaration order).
    pub fn from_daos(model: Arc<ModelDescriptor>, daos: Vec<(String, Arc<dyn Dao>)>) -> Self {
        let security_enabled = model.secured;
        Self {
            model,
            daos,
            strategy: SyncStrategy::default(),
            security_enabled,
            ops_log: Mutex::new(Vec::new()),
            connected: tokio::sync::Mutex::new(HashSet::new()),
        }
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Security enforcement is only meaningful for secured models; it is
    /// forced off otherwise.
    pub fn with_security(mut self, enabled: bool) -> Self {
        self.security_enabled = enabled && self.model.secured;
        self
    }

    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub fn security_enabled(&self) -> bool {
        self.security_enabled
    }

    pub fn storage_names(&self) -> Vec<String> {
        self.daos.iter().map(|(name, _)| name.clone()).collect()
    }

    fn dao(&self, name: &str) -> Option<&(String, Arc<dyn Dao>)> {
        self.daos.iter().find(|(n, _)| n == name)
    }

    fn primary(&self) -> StorageResult<&(String, Arc<dyn Dao>)> {
        self.daos.first().ok_or_else(|| {
            StorageError::Configuration(format!("model {} has no bindings", self.model.name))
        })
    }

    fn targets(&self, storages: Option<&[String]>) -> Vec<(String, Arc<dyn Dao>)> {
        self.daos
            .iter()
            .filter(|(name, _)| storages.map_or(true, |wanted| wanted.iter().any(|w| w == name)))
            .map(|(name, dao)| (name.clone(), Arc::clone(dao)))
            .collect()
    }

    async fn ensure_connected(&self, name: &str, dao: &Arc<dyn Dao>) -> StorageResult<()> {
        let mut connected = self.connected.lock().await;
        if !connected.contains(name) {
            dao.connect().await?;
            connected.insert(name.to_string());
        }
        Ok(())
    }

    fn log_op(&self, op: StorageOperation) {
        self.ops_log.lock().unwrap().push(op);
    }

    /// Redacted storage view of an entity for the operations log.
    fn redacted(&self, entity: &Entity) -> Document {
        sanitize(entity, &self.model)
    }

    /// Redact a patch the same way entities are redacted.
    fn redacted_patch(&self, patch: &Document) -> Document {
        let mut out = patch.clone();
        for (field, template) in &self.model.sensitive_fields {
            if out.contains_key(field) {
                out.insert(field.clone(), Value::String(render_mask(field, template)));
            }
        }
        out
    }

    /// The primary write's returned id: for a graph primary it is the node
    /// UID and lands in `graph_id`; elsewhere it replaces the entity id.
    fn apply_primary_result(&self, entity: &mut Entity, storage_name: &str, result_id: &str) {
        let is_graph = self
            .model
            .binding(storage_name)
            .map(|binding| binding.kind == StorageKind::Graph)
            .unwrap_or(false);
        if is_graph {
            if self.model.secured {
                entity.security_mut().graph_id = Some(result_id.to_string());
            }
        } else if entity.id != result_id {
            entity.id = result_id.to_string();
        }
    }

    // ── Create ────────────────────────────────────────────────────────────

    pub async fn create(
        &self,
        data: Document,
        context: Option<&SecurityContext>,
        storages: Option<&[String]>,
    ) -> StorageResult<Entity> {
        if self.security_enabled && context.is_none() {
            return Err(StorageError::Permission(
                "Security context required for secured models".into(),
            ));
        }

        let mut entity = Entity::from_document(data, self.model.secured);
        if self.security_enabled {
            if let Some(ctx) = context {
                let security = entity.security_mut();
                security.owner_id = Some(ctx.user_id.clone());
                security.created_by = Some(ctx.user_id.clone());
                security.modified_by = Some(ctx.user_id.clone());
                security.acl.push(
                    AclEntry::new(ctx.user_id.clone(), vec![Permission::Admin])
                        .granted_by("system"),
                );
            }
        }

        let targets = self.targets(storages);
        if targets.is_empty() {
            return Err(StorageError::Configuration(format!(
                "no target storages for model {}",
                self.model.name
            )));
        }

        match self.strategy {
            SyncStrategy::Sequential => self.create_sequential(entity, &targets).await,
            SyncStrategy::Parallel => self.create_parallel(entity, &targets).await,
            SyncStrategy::PrimaryFirst => self.create_primary_first(entity, &targets, false).await,
            SyncStrategy::Eventual => self.create_primary_first(entity, &targets, true).await,
        }
    }

    async fn create_sequential(
        &self,
        mut entity: Entity,
        targets: &[(String, Arc<dyn Dao>)],
    ) -> StorageResult<Entity> {
        for (position, (name, dao)) in targets.iter().enumerate() {
            let op = StorageOperation::new(name.clone(), "create", self.redacted(&entity));
            if let Err(e) = self.ensure_connected(name, dao).await {
                self.log_op(op.fail(e.to_string()));
                self.rollback_creates(&entity.id, targets, Some(name)).await;
                return Err(StorageError::Transaction(format!(
                    "Create failed in {name}: {e}"
                )));
            }
            match dao.create(&entity).await {
                Ok(result_id) => {
                    if position == 0 {
                        self.apply_primary_result(&mut entity, name, &result_id);
                    }
                    self.log_op(op.succeed(result_id));
                }
                Err(e) => {
                    error!(storage = %name, error = %e, "Create failed");
                    self.log_op(op.fail(e.to_string()));
                    self.rollback_creates(&entity.id, targets, Some(name)).await;
                    return Err(StorageError::Transaction(format!(
                        "Create failed in {name}: {e}"
                    )));
                }
            }
        }
        Ok(entity)
    }

    async fn create_parallel(
        &self,
        mut entity: Entity,
        targets: &[(String, Arc<dyn Dao>)],
    ) -> StorageResult<Entity> {
        for (name, dao) in targets {
            self.ensure_connected(name, dao).await?;
        }
        let attempts = targets
            .iter()
            .map(|(name, dao)| self.create_in_storage(&entity, name, dao));
        let results = join_all(attempts).await;

        let failed: Vec<String> = results
            .iter()
            .filter_map(|result| result.as_ref().err().cloned())
            .collect();
        if !failed.is_empty() {
            self.rollback_creates(&entity.id, targets, None).await;
            return Err(StorageError::Transaction(format!(
                "Parallel create failed: {}",
                failed.join("; ")
            )));
        }

        if let (Some(Ok(result_id)), Some((primary_name, _))) = (results.first(), targets.first()) {
            let result_id = result_id.clone();
            self.apply_primary_result(&mut entity, primary_name, &result_id);
        }
        Ok(entity)
    }

    async fn create_primary_first(
        &self,
        mut entity: Entity,
        targets: &[(String, Arc<dyn Dao>)],
        eventual: bool,
    ) -> StorageResult<Entity> {
        let (primary_name, primary_dao) = &targets[0];
        let op = StorageOperation::new(primary_name.clone(), "create", self.redacted(&entity));
        if let Err(e) = self.ensure_connected(primary_name, primary_dao).await {
            self.log_op(op.fail(e.to_string()));
            return Err(StorageError::Transaction(format!(
                "Primary create failed: {e}"
            )));
        }
        match primary_dao.create(&entity).await {
            Ok(result_id) => {
                self.apply_primary_result(&mut entity, primary_name, &result_id);
                self.log_op(op.succeed(result_id));
            }
            Err(e) => {
                self.log_op(op.fail(e.to_string()));
                return Err(StorageError::Transaction(format!(
                    "Primary create failed: {e}"
                )));
            }
        }

        let secondaries: Vec<(String, Arc<dyn Dao>)> = targets[1..].to_vec();
        if secondaries.is_empty() {
            return Ok(entity);
        }

        if eventual {
            // Background replication; failures are logged only.
            let replica = entity.clone();
            tokio::spawn(async move {
                for (name, dao) in secondaries {
                    match dao.create(&replica).await {
                        Ok(_) => info!(storage = %name, "Background sync completed"),
                        Err(e) => error!(storage = %name, error = %e, "Background sync failed"),
                    }
                }
            });
        } else {
            let attempts = secondaries
                .iter()
                .map(|(name, dao)| self.create_in_storage(&entity, name, dao));
            for (result, (name, _)) in join_all(attempts).await.iter().zip(&secondaries) {
                if let Err(e) = result {
                    warn!(storage = %name, error = %e, "Secondary create failed");
                }
            }
        }
        Ok(entity)
    }

    /// Create in one storage, logging the attempt. Returns the assigned id
    /// or the error message.
    async fn create_in_storage(
        &self,
        entity: &Entity,
        name: &str,
        dao: &Arc<dyn Dao>,
    ) -> Result<String, String> {
        let op = StorageOperation::new(name.to_string(), "create", self.redacted(entity));
        if let Err(e) = self.ensure_connected(name, dao).await {
            let message = format!("{name}: {e}");
            self.log_op(op.fail(e.to_string()));
            return Err(message);
        }
        match dao.create(entity).await {
            Ok(result_id) => {
                self.log_op(op.succeed(result_id.clone()));
                Ok(result_id)
            }
            Err(e) => {
                let message = format!("{name}: {e}");
                self.log_op(op.fail(e.to_string()));
                Err(message)
            }
        }
    }

    /// Undo successful creates by deleting the id from written adapters,
    /// stopping at the failure point when one is given.
    async fn rollback_creates(
        &self,
        id: &str,
        targets: &[(String, Arc<dyn Dao>)],
        failed_at: Option<&str>,
    ) {
        for (name, dao) in targets {
            if failed_at == Some(name.as_str()) {
                break;
            }
            match dao.delete(id).await {
                Ok(_) => info!(storage = %name, id, "Rolled back create"),
                Err(e) => error!(storage = %name, id, error = %e, "Rollback failed"),
            }
        }
    }

    // ── Read ──────────────────────────────────────────────────────────────

    pub async fn read(
        &self,
        id: &str,
        context: Option<&SecurityContext>,
        storage_name: Option<&str>,
    ) -> StorageResult<Option<Entity>> {
        if self.security_enabled && context.is_none() {
            return Err(StorageError::Permission(
                "Security context required when security is enabled".into(),
            ));
        }
        let found = self.read_unchecked(id, storage_name).await?;
        if self.security_enabled {
            if let (Some(entity), Some(ctx)) = (&found, context) {
                if !check_permission(entity, ctx, Permission::Read) {
                    return Err(StorageError::Permission("No read permission".into()));
                }
            }
        }
        Ok(found)
    }

    /// Fetch without a permission check; used internally before WRITE/DELETE
    /// checks so the right permission gates the operation.
    async fn read_unchecked(
        &self,
        id: &str,
        storage_name: Option<&str>,
    ) -> StorageResult<Option<Entity>> {
        let (name, dao) = match storage_name {
            Some(requested) => self.dao(requested).ok_or_else(|| {
                StorageError::Configuration(format!("storage '{requested}' not configured"))
            })?,
            None => self.primary()?,
        };
        self.ensure_connected(name, dao).await?;
        dao.find_by_id(id).await
    }

    // ── Update ────────────────────────────────────────────────────────────

    pub async fn update(
        &self,
        id: &str,
        patch: Document,
        context: Option<&SecurityContext>,
        storages: Option<&[String]>,
    ) -> StorageResult<Entity> {
        let current = self
            .read_unchecked(id, None)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("instance {id}")))?;

        let mut patch = patch;
        if self.security_enabled {
            let ctx = context.ok_or_else(|| {
                StorageError::Permission("Security context required".into())
            })?;
            if !check_permission(&current, ctx, Permission::Write) {
                return Err(StorageError::Permission("No write permission".into()));
            }
            patch.insert("modified_by".into(), Value::String(ctx.user_id.clone()));
        }

        let targets = self.targets(storages);
        let logged_patch = self.redacted_patch(&patch);

        if self.strategy == SyncStrategy::Parallel {
            for (name, dao) in &targets {
                self.ensure_connected(name, dao).await?;
            }
            let attempts = targets.iter().map(|(_, dao)| dao.update(id, &patch));
            let results = join_all(attempts).await;
            for ((name, _), result) in targets.iter().zip(&results) {
                let op = StorageOperation::new(name.clone(), "update", logged_patch.clone());
                match result {
                    Ok(applied) => self.log_op(op.succeed(*applied)),
                    Err(e) => self.log_op(op.fail(e.to_string())),
                }
            }
            if let Some(e) = results.into_iter().find_map(Result::err) {
                return Err(e);
            }
        } else {
            for (name, dao) in &targets {
                self.ensure_connected(name, dao).await?;
                let op = StorageOperation::new(name.clone(), "update", logged_patch.clone());
                match dao.update(id, &patch).await {
                    Ok(applied) => self.log_op(op.succeed(applied)),
                    Err(e) => {
                        self.log_op(op.fail(e.to_string()));
                        return Err(e);
                    }
                }
            }
        }

        self.read_unchecked(id, None)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("instance {id}")))
    }

    // ── Delete ────────────────────────────────────────────────────────────

    pub async fn delete(
        &self,
        id: &str,
        context: Option<&SecurityContext>,
        storages: Option<&[String]>,
    ) -> StorageResult<bool> {
        let Some(current) = self.read_unchecked(id, None).await? else {
            return Ok(false);
        };
        if self.security_enabled {
            let ctx = context.ok_or_else(|| {
                StorageError::Permission("Security context required".into())
            })?;
            if !check_permission(&current, ctx, Permission::Delete) {
                return Err(StorageError::Permission("No delete permission".into()));
            }
        }

        let mut targets = self.targets(storages);
        // Under primary-first semantics the source of truth goes last, so
        // every mirror is gone before the canonical record.
        if matches!(
            self.strategy,
            SyncStrategy::PrimaryFirst | SyncStrategy::Eventual
        ) && targets.len() > 1
        {
            let primary = targets.remove(0);
            targets.push(primary);
        }

        let mut success = true;
        for (name, dao) in &targets {
            if let Err(e) = self.ensure_connected(name, dao).await {
                error!(storage = %name, error = %e, "Delete failed");
                success = false;
                continue;
            }
            let op = StorageOperation::new(name.clone(), "delete", Document::new());
            match dao.delete(id).await {
                Ok(deleted) => {
                    success = success && deleted;
                    self.log_op(op.succeed(deleted));
                }
                Err(e) => {
                    error!(storage = %name, error = %e, "Delete failed");
                    self.log_op(op.fail(e.to_string()));
                    success = false;
                }
            }
        }
        Ok(success)
    }

    // ── Find / query ──────────────────────────────────────────────────────

    pub async fn find(
        &self,
        query: &Document,
        context: Option<&SecurityContext>,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>> {
        let (name, dao) = self.primary()?;
        self.ensure_connected(name, dao).await?;

        if self.security_enabled {
            if let Some(ctx) = context {
                let security_filter = security_filter(ctx);
                let combined = if query.is_empty() {
                    security_filter
                } else {
                    let mut and = Document::new();
                    and.insert(
                        "$and".into(),
                        Value::Array(vec![
                            Value::Object(query.clone()),
                            Value::Object(security_filter),
                        ]),
                    );
                    and
                };
                let parsed = Query::from_document(&combined)?;
                let candidates = dao.find(&parsed, limit, skip).await?;
                return Ok(candidates
                    .into_iter()
                    .filter(|entity| check_permission(entity, ctx, Permission::Read))
                    .collect());
            }
            return Ok(Vec::new());
        }

        let parsed = Query::from_document(query)?;
        dao.find(&parsed, limit, skip).await
    }

    /// Alias for [`UnifiedCrud::find`].
    pub async fn query(
        &self,
        query: &Document,
        context: Option<&SecurityContext>,
        limit: Option<u64>,
        skip: u64,
    ) -> StorageResult<Vec<Entity>> {
        self.find(query, context, limit, skip).await
    }

    // ── Bulk ──────────────────────────────────────────────────────────────

    pub async fn bulk_create(
        &self,
        items: Vec<Document>,
        context: Option<&SecurityContext>,
    ) -> StorageResult<Vec<String>> {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let entity = self.create(item, context, None).await?;
            ids.push(entity.id);
        }
        Ok(ids)
    }

    pub async fn bulk_delete(
        &self,
        ids: &[String],
        context: Option<&SecurityContext>,
    ) -> StorageResult<u64> {
        let mut count = 0;
        for id in ids {
            if self.delete(id, context, None).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    // ── Replication ───────────────────────────────────────────────────────

    /// Replicate one instance from `source_storage` to the other bindings
    /// (or the named subset). Per-target failures are logged; returns whether
    /// every target synced.
    pub async fn sync_instance(
        &self,
        id: &str,
        source_storage: &str,
        target_storages: Option<&[String]>,
    ) -> StorageResult<bool> {
        let Some(source) = self.read_unchecked(id, Some(source_storage)).await? else {
            return Ok(false);
        };

        let mut success = true;
        for (name, dao) in &self.daos {
            if name == source_storage {
                continue;
            }
            if let Some(wanted) = target_storages {
                if !wanted.iter().any(|w| w == name) {
                    continue;
                }
            }
            if let Err(e) = self.ensure_connected(name, dao).await {
                error!(storage = %name, error = %e, "Sync failed");
                success = false;
                continue;
            }
            let outcome = if dao.exists(id).await.unwrap_or(false) {
                dao.update(id, &source.to_document()).await.map(|_| ())
            } else {
                dao.create(&source).await.map(|_| ())
            };
            if let Err(e) = outcome {
                error!(storage = %name, error = %e, "Sync failed");
                success = false;
            }
        }
        Ok(success)
    }

    // ── Operations log ────────────────────────────────────────────────────

    pub fn operations_log(&self) -> Vec<StorageOperation> {
        self.ops_log.lock().unwrap().clone()
    }

    pub fn clear_operations_log(&self) {
        self.ops_log.lock().unwrap().clear();
    }
}

/// The security filter intersected into secured finds:
/// owner, or any ACL entry naming one of the caller's principals.
fn security_filter(ctx: &SecurityContext) -> Document {
    let mut owner = Document::new();
    owner.insert("owner_id".into(), Value::String(ctx.user_id.clone()));

    let mut acl_in = Document::new();
    let mut in_op = Document::new();
    in_op.insert(
        "$in".into(),
        Value::Array(
            ctx.principal_ids()
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
    );
    acl_in.insert("acl.principal_id".into(), Value::Object(in_op));

    let mut filter = Document::new();
    filter.insert(
        "$or".into(),
        Value::Array(vec![Value::Object(owner), Value::Object(acl_in)]),
    );
    filter
}
