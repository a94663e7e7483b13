//! Pool configuration, states, payloads, and errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::WorkerContext;

/// Which execution substrate a pool spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolFlavor {
    Thread,
    Process,
}

/// State of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Starting,
    Idle,
    Busy,
    Hibernating,
    Stopping,
    Dead,
}

/// State of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Active,
    Completed,
    Failed,
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub name: String,
    pub flavor: PoolFlavor,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Idle-or-hibernating slots the warmup loop keeps ready.
    pub warm_workers: usize,
    pub worker_ttl: Duration,
    /// Zero disables the health-check loop.
    pub health_check_interval: Duration,
    pub acquire_timeout: Duration,
    pub max_tasks_per_worker: Option<u64>,
    pub enable_hibernation: bool,
    pub hibernation_delay: Duration,
    /// Named task executed on each worker after spawn and after wakeup.
    pub init_task: Option<String>,
    /// Environment handed to process-flavor children.
    pub worker_env: Vec<(String, String)>,
}

impl PoolSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor: PoolFlavor::Thread,
            min_workers: 1,
            max_workers: 10,
            warm_workers: 2,
            worker_ttl: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
            max_tasks_per_worker: None,
            enable_hibernation: true,
            hibernation_delay: Duration::from_secs(60),
            init_task: None,
            worker_env: Vec::new(),
        }
    }

    pub fn flavor(mut self, flavor: PoolFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn workers(mut self, min: usize, max: usize) -> Self {
        self.min_workers = min;
        self.max_workers = max.max(1);
        self
    }

    pub fn warm_workers(mut self, warm: usize) -> Self {
        self.warm_workers = warm;
        self
    }

    pub fn worker_ttl(mut self, ttl: Duration) -> Self {
        self.worker_ttl = ttl;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn max_tasks_per_worker(mut self, max: u64) -> Self {
        self.max_tasks_per_worker = Some(max);
        self
    }

    pub fn hibernation(mut self, enabled: bool, delay: Duration) -> Self {
        self.enable_hibernation = enabled;
        self.hibernation_delay = delay;
        self
    }

    pub fn init_task(mut self, name: impl Into<String>) -> Self {
        self.init_task = Some(name.into());
        self
    }
}

/// Work shipped to a worker.
pub enum TaskPayload {
    /// A registered task name with JSON arguments. The process flavor
    /// resolves the name inside the child binary.
    Named { name: String, args: Vec<Value> },
    /// An in-process closure; thread flavor only.
    Closure(TaskClosure),
}

/// Closure form of a task; receives the worker's private state map.
pub type TaskClosure = Box<dyn FnOnce(&mut WorkerContext) -> Result<Value, String> + Send>;

impl TaskPayload {
    pub fn named(name: impl Into<String>, args: Vec<Value>) -> Self {
        TaskPayload::Named {
            name: name.into(),
            args,
        }
    }

    pub fn closure(
        f: impl FnOnce(&mut WorkerContext) -> Result<Value, String> + Send + 'static,
    ) -> Self {
        TaskPayload::Closure(Box::new(f))
    }
}

impl std::fmt::Debug for TaskPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPayload::Named { name, args } => f
                .debug_struct("Named")
                .field("name", name)
                .field("args", args)
                .finish(),
            TaskPayload::Closure(_) => f.write_str("Closure"),
        }
    }
}

/// Per-task submit options.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskOptions {
    /// Higher dispatches first; ties run FIFO.
    pub priority: i64,
    /// Cancels the task's future; process children are killed if still alive.
    pub timeout: Option<Duration>,
}

impl TaskOptions {
    pub fn priority(priority: i64) -> Self {
        Self {
            priority,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Pool statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub flavor: PoolFlavor,
    pub total_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    pub hibernating_workers: usize,
    pub pending_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub average_task_time_secs: f64,
    pub uptime_secs: f64,
    pub last_health_check_secs_ago: Option<f64>,
}

/// Worker-pool failures.
#[derive(Debug)]
pub enum PoolError {
    /// No worker became available, or a task exceeded its deadline.
    Timeout(String),
    /// The pool is shutting down.
    ShuttingDown,
    /// The task raised; carries the captured error message.
    TaskFailed(String),
    /// Worker creation failed.
    Spawn(String),
    /// Unknown task or worker id.
    NotFound(String),
    /// The payload cannot run on this flavor (e.g. closures on processes).
    Unsupported(String),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Timeout(msg) => write!(f, "Timeout: {msg}"),
            PoolError::ShuttingDown => write!(f, "Pool is shutting down"),
            PoolError::TaskFailed(msg) => write!(f, "Task failed: {msg}"),
            PoolError::Spawn(msg) => write!(f, "Worker spawn failed: {msg}"),
            PoolError::NotFound(msg) => write!(f, "Not found: {msg}"),
            PoolError::Unsupported(msg) => write!(f, "Unsupported: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// What a pool flavor must provide: spawn, execute, probe, and lifecycle
/// transitions for its workers. All calls run off the pool lock.
#[async_trait]
pub trait WorkerBackend: Send + Sync + 'static {
    type Worker: Send + Sync + 'static;

    async fn spawn_worker(&self, worker_id: &str) -> Result<Self::Worker, PoolError>;

    async fn execute(
        &self,
        worker: &Self::Worker,
        payload: TaskPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError>;

    /// Probe with a trivial task; `false` marks the worker for replacement.
    async fn health_check(&self, worker: &Self::Worker) -> bool;

    /// Restore a clean state between tasks.
    async fn reset(&self, worker: &Self::Worker);

    async fn hibernate(&self, worker: &Self::Worker);

    async fn wake(&self, worker: &Self::Worker);

    async fn destroy(&self, worker: &Self::Worker);
}
