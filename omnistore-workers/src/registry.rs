//! Named task functions.
//!
//! Tasks submitted as names are resolved through a registry: in-process for
//! the thread flavor, inside the child binary for the process flavor. This is
//! the typed replacement for dispatching `module:function` strings.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

/// Private per-worker state handed to every task invocation.
///
/// Only the owning worker touches it; initializer tasks typically populate it
/// and later tasks read it.
#[derive(Debug, Default)]
pub struct WorkerContext {
    pub state: HashMap<String, Value>,
}

/// A registered task function.
pub type TaskFn = Arc<dyn Fn(&[Value], &mut WorkerContext) -> Result<Value, String> + Send + Sync>;

/// Name → task function map.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskFn>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in tasks used for health checks
    /// and tests: `ping`, `echo`, `sleep_ms`, `fib`, `state_set`, `state_get`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping", |_args, _ctx| Ok(json!("pong")));
        registry.register("echo", |args, _ctx| {
            Ok(args.first().cloned().unwrap_or(Value::Null))
        });
        registry.register("sleep_ms", |args, _ctx| {
            let ms = args.first().and_then(Value::as_u64).unwrap_or(0);
            std::thread::sleep(std::time::Duration::from_millis(ms));
            Ok(json!(ms))
        });
        registry.register("fib", |args, _ctx| {
            let n = args.first().and_then(Value::as_u64).unwrap_or(0);
            Ok(json!(fib(n)))
        });
        registry.register("state_set", |args, ctx| {
            let key = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| "state_set expects (key, value)".to_string())?;
            let value = args.get(1).cloned().unwrap_or(Value::Null);
            ctx.state.insert(key.to_string(), value);
            Ok(Value::Null)
        });
        registry.register("state_get", |args, ctx| {
            let key = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| "state_get expects (key)".to_string())?;
            Ok(ctx.state.get(key).cloned().unwrap_or(Value::Null))
        });
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        task: impl Fn(&[Value], &mut WorkerContext) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.tasks.insert(name.into(), Arc::new(task));
    }

    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    /// Resolve and run a named task.
    pub fn run(&self, name: &str, args: &[Value], ctx: &mut WorkerContext) -> Result<Value, String> {
        match self.get(name) {
            Some(task) => task(args, ctx),
            None => Err(format!("unknown task: {name}")),
        }
    }
}

fn fib(n: u64) -> u64 {
    match n {
        0 => 0,
        1 => 1,
        _ => {
            let (mut a, mut b) = (0u64, 1u64);
            for _ in 1..n {
                let next = a.wrapping_add(b);
                a = b;
                b = next;
            }
            b
        }
    }
}
