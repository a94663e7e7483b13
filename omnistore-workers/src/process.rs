//! Process-flavored workers: one child process per worker.
//!
//! The child runs the `omnistore-worker` binary (or any binary calling
//! [`worker_main`]) and speaks line-delimited JSON over stdio: one
//! [`WireRequest`] in, one [`WireResponse`] out. Named tasks resolve against
//! the registry compiled into the child. Hibernation delivers SIGSTOP /
//! SIGCONT on unix.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::warn;

use crate::registry::{TaskRegistry, WorkerContext};
use crate::types::{PoolError, TaskPayload, WorkerBackend};

/// One task request shipped to the child.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireRequest {
    pub task: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// The child's answer.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

struct ChildIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Handle to one worker process.
pub struct ProcessWorker {
    io: Mutex<ChildIo>,
    pid: Option<u32>,
}

/// Backend spawning a child process per worker.
pub struct ProcessBackend {
    binary: PathBuf,
    env: Vec<(String, String)>,
}

impl ProcessBackend {
    /// Use the `omnistore-worker` binary next to the current executable.
    pub fn new() -> Self {
        let binary = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("omnistore-worker")))
            .unwrap_or_else(|| PathBuf::from("omnistore-worker"));
        Self {
            binary,
            env: Vec::new(),
        }
    }

    /// Use an explicit worker binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            env: Vec::new(),
        }
    }

    /// Environment variables handed to every child.
    pub fn env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn exchange(io: &mut ChildIo, line: &str) -> Result<WireResponse, PoolError> {
    io.stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| PoolError::TaskFailed(format!("worker stdin closed: {e}")))?;
    io.stdin
        .write_all(b"\n")
        .await
        .map_err(|e| PoolError::TaskFailed(format!("worker stdin closed: {e}")))?;
    io.stdin
        .flush()
        .await
        .map_err(|e| PoolError::TaskFailed(format!("worker stdin closed: {e}")))?;

    let mut buf = String::new();
    let read = io
        .stdout
        .read_line(&mut buf)
        .await
        .map_err(|e| PoolError::TaskFailed(format!("worker stdout closed: {e}")))?;
    if read == 0 {
        return Err(PoolError::TaskFailed("worker process exited".into()));
    }
    serde_json::from_str(&buf)
        .map_err(|e| PoolError::TaskFailed(format!("malformed worker response: {e}")))
}

#[async_trait]
impl WorkerBackend for ProcessBackend {
    type Worker = ProcessWorker;

    async fn spawn_worker(&self, _worker_id: &str) -> Result<Self::Worker, PoolError> {
        let mut command = Command::new(&self.binary);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        let mut child = command
            .spawn()
            .map_err(|e| PoolError::Spawn(format!("{}: {e}", self.binary.display())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Spawn("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| PoolError::Spawn("child stdout unavailable".into()))?;
        let pid = child.id();
        Ok(ProcessWorker {
            io: Mutex::new(ChildIo {
                child,
                stdin,
                stdout,
            }),
            pid,
        })
    }

    async fn execute(
        &self,
        worker: &Self::Worker,
        payload: TaskPayload,
        timeout: Option<Duration>,
    ) -> Result<Value, PoolError> {
        let TaskPayload::Named { name, args } = payload else {
            return Err(PoolError::Unsupported(
                "process workers only run named tasks".into(),
            ));
        };
        let line = serde_json::to_string(&WireRequest { task: name, args })
            .map_err(|e| PoolError::TaskFailed(e.to_string()))?;

        let mut io = worker.io.lock().await;
        let response = match timeout {
            Some(timeout) => {
                let outcome = tokio::time::timeout(timeout, exchange(&mut io, &line)).await;
                match outcome {
                    Ok(response) => response?,
                    Err(_) => {
                        // The child may be stuck mid-task; kill it so the pool
                        // replaces the worker.
                        let _ = io.child.start_kill();
                        return Err(PoolError::Timeout(format!(
                            "task timed out after {timeout:?}"
                        )));
                    }
                }
            }
            None => exchange(&mut io, &line).await?,
        };
        match response.err {
            Some(message) => Err(PoolError::TaskFailed(message)),
            None => Ok(response.ok.unwrap_or(Value::Null)),
        }
    }

    async fn health_check(&self, worker: &Self::Worker) -> bool {
        matches!(
            self.execute(
                worker,
                TaskPayload::named("ping", Vec::new()),
                Some(Duration::from_secs(1)),
            )
            .await,
            Ok(value) if value == json!("pong")
        )
    }

    async fn reset(&self, _worker: &Self::Worker) {
        // Child state is reset on retirement; nothing to do per release.
    }

    #[cfg(unix)]
    async fn hibernate(&self, worker: &Self::Worker) {
        if let Some(pid) = worker.pid {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGSTOP) };
            if rc != 0 {
                warn!(pid, "Could not hibernate worker process");
            }
        }
    }

    #[cfg(not(unix))]
    async fn hibernate(&self, _worker: &Self::Worker) {}

    #[cfg(unix)]
    async fn wake(&self, worker: &Self::Worker) {
        if let Some(pid) = worker.pid {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGCONT) };
            if rc != 0 {
                warn!(pid, "Could not wake worker process");
            }
        }
    }

    #[cfg(not(unix))]
    async fn wake(&self, _worker: &Self::Worker) {}

    async fn destroy(&self, worker: &Self::Worker) {
        let mut io = worker.io.lock().await;
        let _ = io.child.kill().await;
    }
}

/// Serve the worker side of the wire protocol over stdio. Never returns.
///
/// Deployments with custom tasks build their own binary: register the tasks
/// on a [`TaskRegistry`] and hand it here.
pub fn worker_main(registry: TaskRegistry) -> ! {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut ctx = WorkerContext::default();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => match registry.run(&request.task, &request.args, &mut ctx) {
                Ok(value) => WireResponse {
                    ok: Some(value),
                    err: None,
                },
                Err(message) => WireResponse {
                    ok: None,
                    err: Some(message),
                },
            },
            Err(e) => WireResponse {
                ok: None,
                err: Some(format!("malformed request: {e}")),
            },
        };
        let Ok(encoded) = serde_json::to_string(&response) else {
            break;
        };
        if writeln!(stdout, "{encoded}").is_err() {
            break;
        }
        let _ = stdout.flush();
    }
    std::process::exit(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_request_round_trips() {
        let request = WireRequest {
            task: "fib".into(),
            args: vec![json!(10)],
        };
        let line = serde_json::to_string(&request).unwrap();
        let back: WireRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(back.task, "fib");
        assert_eq!(back.args, vec![json!(10)]);
    }

    #[test]
    fn wire_response_encodes_one_side() {
        let ok = serde_json::to_string(&WireResponse {
            ok: Some(json!(55)),
            err: None,
        })
        .unwrap();
        assert_eq!(ok, r#"{"ok":55}"#);

        let err = serde_json::to_string(&WireResponse {
            ok: None,
            err: Some("boom".into()),
        })
        .unwrap();
        assert_eq!(err, r#"{"err":"boom"}"#);
    }

    #[tokio::test]
    async fn closure_payloads_are_rejected() {
        let backend = ProcessBackend::new();
        // Spawn is not needed to validate the payload check; build a fake
        // worker only if a binary exists. The payload check happens first,
        // so a missing binary never gets that far here.
        let spawned = backend.spawn_worker("p-1").await;
        if let Ok(worker) = spawned {
            let err = backend
                .execute(&worker, TaskPayload::closure(|_| Ok(Value::Null)), None)
                .await
                .unwrap_err();
            assert!(matches!(err, PoolError::Unsupported(_)));
            backend.destroy(&worker).await;
        }
    }
}
