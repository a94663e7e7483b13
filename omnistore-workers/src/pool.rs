//! The generic pool: task queue, worker checkout, and lifecycle loops.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{
    PoolError, PoolSettings, PoolStats, TaskOptions, TaskPayload, TaskState, WorkerBackend,
    WorkerState,
};
use omnistore_core::ids::uuid7;

/// How long `get_result` sleeps between completion checks when no
/// notification arrives (guards against missed wakeups).
const RESULT_POLL: Duration = Duration::from_millis(100);

/// How often the warmup loop tops the pool up.
const WARMUP_INTERVAL: Duration = Duration::from_secs(10);

struct WorkerMeta {
    state: WorkerState,
    created_at: Instant,
    last_activity: Instant,
    task_count: u64,
    error_count: u64,
    current_task: Option<String>,
}

struct PoolState {
    workers: HashMap<String, WorkerMeta>,
    available: VecDeque<String>,
    hibernating: VecDeque<String>,
    shutdown: bool,
    last_health_check: Option<Instant>,
}

struct TaskRecord {
    state: TaskState,
    payload: Option<TaskPayload>,
    options: TaskOptions,
    result: Option<Result<Value, String>>,
    started_at: Option<Instant>,
}

#[derive(PartialEq, Eq)]
struct PendingEntry {
    priority: i64,
    seq: u64,
    task_id: String,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then FIFO by sequence.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct TaskTable {
    pending: BinaryHeap<PendingEntry>,
    records: HashMap<String, TaskRecord>,
    completed: u64,
    failed: u64,
    total_task_secs: f64,
}

struct Inner<B: WorkerBackend> {
    settings: PoolSettings,
    backend: B,
    state: Mutex<PoolState>,
    tasks: Mutex<TaskTable>,
    instances: Mutex<HashMap<String, Arc<B::Worker>>>,
    worker_available: Notify,
    task_done: Notify,
    cancel: CancellationToken,
    created_at: Instant,
    task_seq: AtomicU64,
    worker_seq: AtomicU64,
}

/// A bounded pool of workers with warmup, TTL, hibernation, health checks,
/// priority tasks, and an explicit acquire/release checkout protocol.
///
/// Cheap to clone; all clones share the same pool.
pub struct WorkerPool<B: WorkerBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: WorkerBackend> Clone for WorkerPool<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: WorkerBackend> WorkerPool<B> {
    pub fn new(settings: PoolSettings, backend: B) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                backend,
                state: Mutex::new(PoolState {
                    workers: HashMap::new(),
                    available: VecDeque::new(),
                    hibernating: VecDeque::new(),
                    shutdown: false,
                    last_health_check: None,
                }),
                tasks: Mutex::new(TaskTable {
                    pending: BinaryHeap::new(),
                    records: HashMap::new(),
                    completed: 0,
                    failed: 0,
                    total_task_secs: 0.0,
                }),
                instances: Mutex::new(HashMap::new()),
                worker_available: Notify::new(),
                task_done: Notify::new(),
                cancel: CancellationToken::new(),
                created_at: Instant::now(),
                task_seq: AtomicU64::new(0),
                worker_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn the minimum workers and start the background loops.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        self.inner.ensure_min_workers().await;

        let inner = Arc::clone(&self.inner);
        if inner.settings.health_check_interval > Duration::ZERO {
            let loop_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = loop_inner.cancel.cancelled() => break,
                        _ = tokio::time::sleep(loop_inner.settings.health_check_interval) => {
                            loop_inner.run_health_check().await;
                        }
                    }
                }
            });
        }

        let warm_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = warm_inner.cancel.cancelled() => break,
                    _ = tokio::time::sleep(WARMUP_INTERVAL) => {
                        warm_inner.ensure_warm_workers().await;
                    }
                }
            }
        });

        if inner.settings.enable_hibernation {
            let hib_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = hib_inner.cancel.cancelled() => break,
                        _ = tokio::time::sleep(hib_inner.settings.hibernation_delay) => {
                            hib_inner.hibernate_idle_workers().await;
                        }
                    }
                }
            });
        }

        info!(pool = %self.inner.settings.name, workers = self.inner.state.lock().unwrap().workers.len(), "Worker pool initialized");
        Ok(())
    }

    /// Enqueue a task; higher priority dispatches first, ties run FIFO.
    pub fn submit(&self, payload: TaskPayload, options: TaskOptions) -> Result<String, PoolError> {
        if self.inner.state.lock().unwrap().shutdown {
            return Err(PoolError::ShuttingDown);
        }
        let task_id = uuid7();
        let seq = self.inner.task_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut tasks = self.inner.tasks.lock().unwrap();
            tasks.records.insert(
                task_id.clone(),
                TaskRecord {
                    state: TaskState::Pending,
                    payload: Some(payload),
                    options,
                    result: None,
                    started_at: None,
                },
            );
            tasks.pending.push(PendingEntry {
                priority: options.priority,
                seq,
                task_id: task_id.clone(),
            });
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.process_pending().await });
        Ok(task_id)
    }

    /// Block until the task completes; surfaces the task's error, or a
    /// timeout when the deadline passes first.
    pub async fn get_result(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            {
                let tasks = self.inner.tasks.lock().unwrap();
                let record = tasks
                    .records
                    .get(task_id)
                    .ok_or_else(|| PoolError::NotFound(format!("task {task_id}")))?;
                match record.state {
                    TaskState::Completed => {
                        if let Some(Ok(value)) = &record.result {
                            return Ok(value.clone());
                        }
                        return Ok(Value::Null);
                    }
                    TaskState::Failed => {
                        let message = match &record.result {
                            Some(Err(message)) => message.clone(),
                            _ => format!("task {task_id} failed"),
                        };
                        return Err(PoolError::TaskFailed(message));
                    }
                    TaskState::Pending | TaskState::Active => {}
                }
            }
            if self.inner.cancel.is_cancelled() {
                return Err(PoolError::ShuttingDown);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return Err(PoolError::Timeout(format!("task {task_id} timed out")));
                    };
                    remaining.min(RESULT_POLL)
                }
                None => RESULT_POLL,
            };
            tokio::select! {
                _ = self.inner.task_done.notified() => {}
                _ = tokio::time::sleep(wait) => {}
                _ = self.inner.cancel.cancelled() => return Err(PoolError::ShuttingDown),
            }
        }
    }

    /// Check a worker out of the pool for affinity-sensitive work.
    pub async fn acquire_worker(&self, timeout: Option<Duration>) -> Result<String, PoolError> {
        let timeout = timeout.unwrap_or(self.inner.settings.acquire_timeout);
        self.inner.acquire_worker(timeout).await
    }

    /// Return a checked-out worker; retires it when TTL, task budget, or the
    /// error rate calls for it. Always wakes at least one waiter.
    pub async fn release_worker(&self, worker_id: &str) {
        self.inner.release_worker(worker_id).await;
    }

    /// Run a task directly on a checked-out worker, bypassing the queue.
    pub async fn run_on_worker(
        &self,
        worker_id: &str,
        payload: TaskPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError> {
        let worker = self
            .inner
            .instance(worker_id)
            .ok_or_else(|| PoolError::NotFound(format!("worker {worker_id}")))?;
        let result = self.inner.backend.execute(&worker, payload, timeout).await;
        let mut state = self.inner.state.lock().unwrap();
        if let Some(meta) = state.workers.get_mut(worker_id) {
            meta.task_count += 1;
            if result.is_err() {
                meta.error_count += 1;
            }
        }
        result
    }

    /// Stop the loops, wake every waiter, and destroy all workers.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.inner.cancel.cancel();
        self.inner.worker_available.notify_waiters();
        self.inner.task_done.notify_waiters();

        let ids: Vec<String> = {
            let state = self.inner.state.lock().unwrap();
            state.workers.keys().cloned().collect()
        };
        for id in ids {
            self.inner.remove_worker(&id).await;
        }
        info!(pool = %self.inner.settings.name, "Worker pool shut down");
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }
}

impl<B: WorkerBackend> Inner<B> {
    fn instance(&self, worker_id: &str) -> Option<Arc<B::Worker>> {
        self.instances.lock().unwrap().get(worker_id).cloned()
    }

    async fn add_worker(&self) -> Result<String, PoolError> {
        let worker_id = format!(
            "{}-w{}",
            self.settings.name,
            self.worker_seq.fetch_add(1, Ordering::SeqCst) + 1
        );
        let worker = Arc::new(self.backend.spawn_worker(&worker_id).await?);

        if let Some(init) = &self.settings.init_task {
            if let Err(e) = self
                .backend
                .execute(&worker, TaskPayload::named(init.clone(), Vec::new()), None)
                .await
            {
                warn!(worker = %worker_id, error = %e, "Worker initializer failed");
            }
        }

        self.instances
            .lock()
            .unwrap()
            .insert(worker_id.clone(), worker);
        {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            state.workers.insert(
                worker_id.clone(),
                WorkerMeta {
                    state: WorkerState::Idle,
                    created_at: now,
                    last_activity: now,
                    task_count: 0,
                    error_count: 0,
                    current_task: None,
                },
            );
            state.available.push_back(worker_id.clone());
        }
        self.worker_available.notify_one();
        debug!(worker = %worker_id, "Worker created");
        Ok(worker_id)
    }

    async fn remove_worker(&self, worker_id: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(meta) = state.workers.get_mut(worker_id) {
                meta.state = WorkerState::Stopping;
            }
            state.available.retain(|id| id != worker_id);
            state.hibernating.retain(|id| id != worker_id);
            state.workers.remove(worker_id);
        }
        let instance = self.instances.lock().unwrap().remove(worker_id);
        if let Some(worker) = instance {
            self.backend.destroy(&worker).await;
        }
        debug!(worker = %worker_id, "Worker destroyed");
    }

    fn should_retire(&self, meta: &WorkerMeta) -> bool {
        if meta.created_at.elapsed() >= self.settings.worker_ttl {
            return true;
        }
        if let Some(max_tasks) = self.settings.max_tasks_per_worker {
            if meta.task_count >= max_tasks {
                return true;
            }
        }
        meta.task_count > 0 && (meta.error_count as f64 / meta.task_count as f64) > 0.5
    }

    /// Pop an idle or hibernating worker and mark it busy. Returns the id and
    /// whether it needs waking.
    fn try_claim(&self) -> Option<(String, bool)> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.available.pop_front() {
            if let Some(meta) = state.workers.get_mut(&id) {
                meta.state = WorkerState::Busy;
                meta.last_activity = Instant::now();
            }
            return Some((id, false));
        }
        if self.settings.enable_hibernation {
            if let Some(id) = state.hibernating.pop_front() {
                if let Some(meta) = state.workers.get_mut(&id) {
                    meta.state = WorkerState::Busy;
                    meta.last_activity = Instant::now();
                }
                return Some((id, true));
            }
        }
        None
    }

    fn claim_specific(&self, worker_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let position = state.available.iter().position(|id| id == worker_id);
        match position {
            Some(index) => {
                let _ = state.available.remove(index);
                if let Some(meta) = state.workers.get_mut(worker_id) {
                    meta.state = WorkerState::Busy;
                    meta.last_activity = Instant::now();
                }
                true
            }
            None => false,
        }
    }

    async fn wake_worker(&self, worker_id: &str) {
        if let Some(worker) = self.instance(worker_id) {
            self.backend.wake(&worker).await;
            if let Some(init) = &self.settings.init_task {
                if let Err(e) = self
                    .backend
                    .execute(&worker, TaskPayload::named(init.clone(), Vec::new()), None)
                    .await
                {
                    warn!(worker = %worker_id, error = %e, "Worker re-initializer failed");
                }
            }
        }
    }

    async fn acquire_worker(&self, timeout: Duration) -> Result<String, PoolError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state.lock().unwrap().shutdown {
                return Err(PoolError::ShuttingDown);
            }

            if let Some((worker_id, needs_wake)) = self.try_claim() {
                if needs_wake {
                    self.wake_worker(&worker_id).await;
                }
                return Ok(worker_id);
            }

            let below_max = {
                let state = self.state.lock().unwrap();
                !state.shutdown && state.workers.len() < self.settings.max_workers
            };
            if below_max {
                match self.add_worker().await {
                    Ok(worker_id) => {
                        if self.claim_specific(&worker_id) {
                            return Ok(worker_id);
                        }
                        // Another waiter won the race; try again.
                        continue;
                    }
                    Err(e) => warn!(error = %e, "Failed to create worker"),
                }
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(PoolError::Timeout(format!(
                    "failed to acquire worker within {timeout:?}"
                )));
            };
            tokio::select! {
                _ = self.worker_available.notified() => {}
                _ = tokio::time::sleep(remaining) => {
                    return Err(PoolError::Timeout(format!(
                        "failed to acquire worker within {timeout:?}"
                    )));
                }
                _ = self.cancel.cancelled() => return Err(PoolError::ShuttingDown),
            }
        }
    }

    async fn release_worker(&self, worker_id: &str) {
        enum Action {
            Retire,
            Reuse,
            Missing,
        }
        let action = {
            let mut state = self.state.lock().unwrap();
            match state.workers.get_mut(worker_id) {
                Some(meta) => {
                    meta.current_task = None;
                    meta.last_activity = Instant::now();
                    if self.should_retire(meta) {
                        Action::Retire
                    } else {
                        Action::Reuse
                    }
                }
                None => Action::Missing,
            }
        };
        match action {
            Action::Retire => {
                self.remove_worker(worker_id).await;
                self.ensure_min_workers().await;
            }
            Action::Reuse => {
                if let Some(worker) = self.instance(worker_id) {
                    self.backend.reset(&worker).await;
                }
                let mut state = self.state.lock().unwrap();
                if let Some(meta) = state.workers.get_mut(worker_id) {
                    meta.state = WorkerState::Idle;
                }
                state.available.push_back(worker_id.to_string());
            }
            Action::Missing => {}
        }
        self.worker_available.notify_one();
    }

    fn pop_pending(&self) -> Option<(String, TaskPayload, TaskOptions)> {
        let mut tasks = self.tasks.lock().unwrap();
        while let Some(entry) = tasks.pending.pop() {
            if let Some(record) = tasks.records.get_mut(&entry.task_id) {
                if record.state == TaskState::Pending {
                    record.state = TaskState::Active;
                    record.started_at = Some(Instant::now());
                    let payload = record.payload.take();
                    let options = record.options;
                    if let Some(payload) = payload {
                        return Some((entry.task_id, payload, options));
                    }
                }
            }
        }
        None
    }

    fn has_pending(&self) -> bool {
        let tasks = self.tasks.lock().unwrap();
        tasks
            .records
            .values()
            .any(|r| r.state == TaskState::Pending)
    }

    async fn process_pending(self: Arc<Self>) {
        while self.has_pending() && !self.cancel.is_cancelled() {
            let worker_id = match self.acquire_worker(Duration::from_secs(1)).await {
                Ok(worker_id) => worker_id,
                Err(PoolError::Timeout(_)) => continue,
                Err(_) => break,
            };

            match self.pop_pending() {
                Some((task_id, payload, options)) => {
                    {
                        let mut state = self.state.lock().unwrap();
                        if let Some(meta) = state.workers.get_mut(&worker_id) {
                            meta.current_task = Some(task_id.clone());
                        }
                    }
                    let runner = Arc::clone(&self);
                    tokio::spawn(async move {
                        runner.run_task(worker_id, task_id, payload, options).await;
                    });
                }
                None => {
                    self.release_worker(&worker_id).await;
                    break;
                }
            }
        }
    }

    async fn run_task(
        self: Arc<Self>,
        worker_id: String,
        task_id: String,
        payload: TaskPayload,
        options: TaskOptions,
    ) {
        let result = match self.instance(&worker_id) {
            Some(worker) => self.backend.execute(&worker, payload, options.timeout).await,
            None => Err(PoolError::NotFound(format!("worker {worker_id}"))),
        };
        let failed = result.is_err();

        {
            let mut tasks = self.tasks.lock().unwrap();
            let elapsed = tasks
                .records
                .get(&task_id)
                .and_then(|r| r.started_at)
                .map(|s| s.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            if let Some(record) = tasks.records.get_mut(&task_id) {
                match result {
                    Ok(value) => {
                        record.state = TaskState::Completed;
                        record.result = Some(Ok(value));
                    }
                    Err(e) => {
                        record.state = TaskState::Failed;
                        record.result = Some(Err(e.to_string()));
                    }
                }
            }
            if failed {
                tasks.failed += 1;
            } else {
                tasks.completed += 1;
                tasks.total_task_secs += elapsed;
            }
        }
        {
            let mut state = self.state.lock().unwrap();
            if let Some(meta) = state.workers.get_mut(&worker_id) {
                meta.task_count += 1;
                if failed {
                    meta.error_count += 1;
                }
                meta.current_task = None;
            }
        }
        self.release_worker(&worker_id).await;
        self.task_done.notify_waiters();
    }

    async fn ensure_min_workers(&self) {
        loop {
            let needed = {
                let state = self.state.lock().unwrap();
                if state.shutdown {
                    return;
                }
                state.workers.len() < self.settings.min_workers
            };
            if !needed {
                return;
            }
            if let Err(e) = self.add_worker().await {
                warn!(error = %e, "Failed to restore minimum workers");
                return;
            }
        }
    }

    async fn ensure_warm_workers(&self) {
        loop {
            let needed = {
                let state = self.state.lock().unwrap();
                if state.shutdown {
                    return;
                }
                let warm = state.available.len() + state.hibernating.len();
                warm < self.settings.warm_workers
                    && state.workers.len() < self.settings.max_workers
            };
            if !needed {
                return;
            }
            if let Err(e) = self.add_worker().await {
                warn!(error = %e, "Warmup failed");
                return;
            }
        }
    }

    async fn run_health_check(&self) {
        let candidates: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .workers
                .iter()
                .filter(|(_, meta)| meta.state != WorkerState::Busy)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for worker_id in candidates {
            let healthy = match self.instance(&worker_id) {
                Some(worker) => self.backend.health_check(&worker).await,
                None => false,
            };
            if !healthy {
                warn!(worker = %worker_id, "Health check failed; replacing worker");
                self.remove_worker(&worker_id).await;
            }
        }
        self.state.lock().unwrap().last_health_check = Some(Instant::now());
        self.ensure_min_workers().await;
    }

    async fn hibernate_idle_workers(&self) {
        let to_hibernate: Vec<String> = {
            let mut state = self.state.lock().unwrap();
            let delay = self.settings.hibernation_delay;
            let mut chosen = Vec::new();
            let idle_ids: Vec<String> = state
                .available
                .iter()
                .filter(|id| {
                    state
                        .workers
                        .get(*id)
                        .is_some_and(|m| m.last_activity.elapsed() > delay)
                })
                .cloned()
                .collect();
            for id in idle_ids {
                state.available.retain(|w| w != &id);
                state.hibernating.push_back(id.clone());
                if let Some(meta) = state.workers.get_mut(&id) {
                    meta.state = WorkerState::Hibernating;
                }
                chosen.push(id);
            }
            chosen
        };
        for worker_id in to_hibernate {
            if let Some(worker) = self.instance(&worker_id) {
                self.backend.hibernate(&worker).await;
                debug!(worker = %worker_id, "Worker hibernated");
            }
        }
    }

    fn stats(&self) -> PoolStats {
        let state = self.state.lock().unwrap();
        let tasks = self.tasks.lock().unwrap();
        let mut idle = 0;
        let mut busy = 0;
        let mut hibernating = 0;
        for meta in state.workers.values() {
            match meta.state {
                WorkerState::Idle | WorkerState::Starting => idle += 1,
                WorkerState::Busy => busy += 1,
                WorkerState::Hibernating => hibernating += 1,
                WorkerState::Stopping | WorkerState::Dead => {}
            }
        }
        let pending = tasks
            .records
            .values()
            .filter(|r| r.state == TaskState::Pending)
            .count();
        PoolStats {
            name: self.settings.name.clone(),
            flavor: self.settings.flavor,
            total_workers: state.workers.len(),
            idle_workers: idle,
            busy_workers: busy,
            hibernating_workers: hibernating,
            pending_tasks: pending,
            completed_tasks: tasks.completed,
            failed_tasks: tasks.failed,
            average_task_time_secs: if tasks.completed > 0 {
                tasks.total_task_secs / tasks.completed as f64
            } else {
                0.0
            },
            uptime_secs: self.created_at.elapsed().as_secs_f64(),
            last_health_check_secs_ago: state
                .last_health_check
                .map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

/// Object-safe pool surface used by [`crate::PoolManager`].
#[async_trait]
pub trait PoolHandle: Send + Sync {
    async fn submit_task(
        &self,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> Result<String, PoolError>;
    async fn task_result(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError>;
    async fn acquire(&self, timeout: Option<Duration>) -> Result<String, PoolError>;
    async fn release(&self, worker_id: &str);
    async fn run_on(
        &self,
        worker_id: &str,
        payload: TaskPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError>;
    async fn stop(&self);
    fn pool_stats(&self) -> PoolStats;
}

#[async_trait]
impl<B: WorkerBackend> PoolHandle for WorkerPool<B> {
    async fn submit_task(
        &self,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> Result<String, PoolError> {
        self.submit(payload, options)
    }

    async fn task_result(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError> {
        self.get_result(task_id, timeout).await
    }

    async fn acquire(&self, timeout: Option<Duration>) -> Result<String, PoolError> {
        self.acquire_worker(timeout).await
    }

    async fn release(&self, worker_id: &str) {
        self.release_worker(worker_id).await;
    }

    async fn run_on(
        &self,
        worker_id: &str,
        payload: TaskPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError> {
        self.run_on_worker(worker_id, payload, timeout).await
    }

    async fn stop(&self) {
        self.shutdown().await;
    }

    fn pool_stats(&self) -> PoolStats {
        self.stats()
    }
}
