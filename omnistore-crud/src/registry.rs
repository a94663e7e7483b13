//! Model-name → engine registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::engine::UnifiedCrud;

/// Engines keyed by model name; an explicit handle created at the
/// composition root (the RPC layer resolves tool calls through one).
/// Lookups are case-insensitive.
#[derive(Default)]
pub struct CrudRegistry {
    engines: Mutex<HashMap<String, Arc<UnifiedCrud>>>,
}

impl CrudRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under its model's name.
    pub fn register(&self, engine: Arc<UnifiedCrud>) {
        let name = engine.model().name.to_lowercase();
        self.engines.lock().unwrap().insert(name, engine);
    }

    pub fn get(&self, model: &str) -> Option<Arc<UnifiedCrud>> {
        self.engines
            .lock()
            .unwrap()
            .get(&model.to_lowercase())
            .cloned()
    }

    pub fn model_names(&self) -> Vec<String> {
        let engines = self.engines.lock().unwrap();
        let mut names: Vec<String> = engines
            .values()
            .map(|engine| engine.model().name.clone())
            .collect();
        names.sort();
        names
    }
}
