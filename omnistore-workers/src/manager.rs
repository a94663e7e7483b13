//! Named-pool registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::pool::{PoolHandle, WorkerPool};
use crate::process::ProcessBackend;
use crate::registry::TaskRegistry;
use crate::thread::ThreadBackend;
use crate::types::{PoolError, PoolFlavor, PoolSettings, PoolStats};

/// Creates and owns named pools; an explicit handle threaded from the
/// composition root.
#[derive(Default)]
pub struct PoolManager {
    pools: Mutex<HashMap<String, Arc<dyn PoolHandle>>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and initialize a pool of the configured flavor.
    pub async fn create_pool(
        &self,
        settings: PoolSettings,
        registry: TaskRegistry,
    ) -> Result<Arc<dyn PoolHandle>, PoolError> {
        let name = settings.name.clone();
        {
            let pools = self.pools.lock().await;
            if pools.contains_key(&name) {
                return Err(PoolError::Spawn(format!("pool '{name}' already exists")));
            }
        }
        let handle: Arc<dyn PoolHandle> = match settings.flavor {
            PoolFlavor::Thread => {
                let pool = WorkerPool::new(settings, ThreadBackend::new(registry));
                pool.initialize().await?;
                Arc::new(pool)
            }
            PoolFlavor::Process => {
                let env = settings.worker_env.clone();
                let pool = WorkerPool::new(settings, ProcessBackend::new().env(env));
                pool.initialize().await?;
                Arc::new(pool)
            }
        };
        self.pools.lock().await.insert(name, Arc::clone(&handle));
        Ok(handle)
    }

    pub async fn get_pool(&self, name: &str) -> Option<Arc<dyn PoolHandle>> {
        self.pools.lock().await.get(name).cloned()
    }

    /// Remove and shut a pool down.
    pub async fn remove_pool(&self, name: &str) {
        let removed = self.pools.lock().await.remove(name);
        if let Some(pool) = removed {
            pool.stop().await;
        }
    }

    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<dyn PoolHandle>> = {
            let mut pools = self.pools.lock().await;
            pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in drained {
            pool.stop().await;
        }
    }

    pub async fn list_pools(&self) -> Vec<String> {
        self.pools.lock().await.keys().cloned().collect()
    }

    pub async fn all_stats(&self) -> Vec<PoolStats> {
        self.pools
            .lock()
            .await
            .values()
            .map(|pool| pool.pool_stats())
            .collect()
    }
}
