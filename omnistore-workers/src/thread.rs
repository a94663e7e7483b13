//! Thread-flavored workers: one dedicated OS thread per worker.

use std::sync::mpsc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::registry::{TaskRegistry, WorkerContext};
use crate::types::{PoolError, TaskClosure, TaskPayload, WorkerBackend};

enum Job {
    Run {
        task: ExecTask,
        reply: tokio::sync::oneshot::Sender<Result<Value, String>>,
    },
    ClearState,
    Stop,
}

enum ExecTask {
    Named { name: String, args: Vec<Value> },
    Closure(TaskClosure),
}

/// Handle to one worker thread.
pub struct ThreadWorker {
    sender: mpsc::Sender<Job>,
}

/// Backend spawning a dedicated thread per worker.
///
/// Each thread owns a private [`WorkerContext`]; tasks mutate it freely.
/// Hibernation for threads is a state clear only; the thread stays parked on
/// its queue.
pub struct ThreadBackend {
    registry: TaskRegistry,
}

impl ThreadBackend {
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }
}

impl Default for ThreadBackend {
    fn default() -> Self {
        Self::new(TaskRegistry::with_builtins())
    }
}

fn worker_loop(receiver: mpsc::Receiver<Job>, registry: TaskRegistry) {
    let mut ctx = WorkerContext::default();
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Run { task, reply } => {
                let result = match task {
                    ExecTask::Named { name, args } => registry.run(&name, &args, &mut ctx),
                    ExecTask::Closure(f) => f(&mut ctx),
                };
                let _ = reply.send(result);
            }
            Job::ClearState => ctx.state.clear(),
            Job::Stop => break,
        }
    }
}

#[async_trait]
impl WorkerBackend for ThreadBackend {
    type Worker = ThreadWorker;

    async fn spawn_worker(&self, worker_id: &str) -> Result<Self::Worker, PoolError> {
        let (sender, receiver) = mpsc::channel();
        let registry = self.registry.clone();
        std::thread::Builder::new()
            .name(worker_id.to_string())
            .spawn(move || worker_loop(receiver, registry))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;
        Ok(ThreadWorker { sender })
    }

    async fn execute(
        &self,
        worker: &Self::Worker,
        payload: TaskPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError> {
        let task = match payload {
            TaskPayload::Named { name, args } => ExecTask::Named { name, args },
            TaskPayload::Closure(f) => ExecTask::Closure(f),
        };
        let (reply, receiver) = tokio::sync::oneshot::channel();
        worker
            .sender
            .send(Job::Run { task, reply })
            .map_err(|_| PoolError::TaskFailed("worker thread terminated".into()))?;

        let outcome = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    return Err(PoolError::Timeout(format!(
                        "task timed out after {timeout:?}"
                    )))
                }
            },
            None => receiver.await,
        };
        match outcome {
            Ok(result) => result.map_err(PoolError::TaskFailed),
            Err(_) => Err(PoolError::TaskFailed("worker thread terminated".into())),
        }
    }

    async fn health_check(&self, worker: &Self::Worker) -> bool {
        let probe = TaskPayload::closure(|_ctx| Ok(json!("pong")));
        matches!(
            self.execute(worker, probe, Some(Duration::from_secs(1))).await,
            Ok(value) if value == json!("pong")
        )
    }

    async fn reset(&self, worker: &Self::Worker) {
        let _ = worker.sender.send(Job::ClearState);
    }

    async fn hibernate(&self, worker: &Self::Worker) {
        // Threads cannot be stopped; drop the state and leave them parked.
        let _ = worker.sender.send(Job::ClearState);
    }

    async fn wake(&self, _worker: &Self::Worker) {}

    async fn destroy(&self, worker: &Self::Worker) {
        let _ = worker.sender.send(Job::Stop);
        debug!("Thread worker stopped");
    }
}
