//! Stdio worker child for process-flavored pools.

use omnistore_workers::process::worker_main;
use omnistore_workers::registry::TaskRegistry;

fn main() {
    worker_main(TaskRegistry::with_builtins())
}
