//! Graph-specific operations: traversals, paths, components, degrees.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::dao::DgraphDao;
use omnistore_core::{StorageError, StorageResult};
use omnistore_model::entity::Document;

impl DgraphDao {
    fn id_predicate(&self) -> String {
        format!("{}.id", self.model_path())
    }

    fn model_path(&self) -> &str {
        &self.model_ref().path
    }

    /// Traverse up to `k` hops out from a starting node.
    ///
    /// Returns `{start_node, hops, traversal}` where `traversal` is the
    /// expanded neighborhood document.
    pub async fn k_hop_query(
        &self,
        start_id: &str,
        k: u32,
        edge_types: Option<&[String]>,
    ) -> StorageResult<Document> {
        if k == 0 {
            return Err(StorageError::Validation("k must be positive".into()));
        }
        // Edge filtering happens client-side; the recursion itself expands
        // every predicate.
        let query = format!(
            "query hops($id: string) {{\n  start(func: eq({pred}, $id)) @filter(type({collection})) @recurse(depth: {depth}, loop: false) {{\n    uid\n    {pred}\n    expand(_all_)\n  }}\n}}",
            pred = self.id_predicate(),
            collection = self.model_path(),
            depth = k + 1,
        );
        let vars = HashMap::from([("$id".to_string(), start_id.to_string())]);
        let data = self.run_read(query, vars).await?;

        let mut traversal = data
            .get("start")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        if let Some(edges) = edge_types {
            let keep: HashSet<String> = edges
                .iter()
                .map(|edge| format!("{}.{edge}", self.model_path()))
                .collect();
            traversal.retain(|key, value| {
                !matches!(value, Value::Array(_) | Value::Object(_)) || keep.contains(key)
            });
        }

        let mut result = Document::new();
        result.insert("start_node".into(), Value::String(start_id.to_string()));
        result.insert("hops".into(), Value::from(k));
        result.insert("traversal".into(), Value::Object(traversal));
        Ok(result)
    }

    /// Shortest path between two nodes via the store's native operator.
    /// Returns the ordered list of stored ids along the path.
    pub async fn shortest_path(
        &self,
        start_id: &str,
        end_id: &str,
        max_depth: u32,
    ) -> StorageResult<Vec<String>> {
        let from = self
            .resolve_uid(start_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("node {start_id}")))?;
        let to = self
            .resolve_uid(end_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("node {end_id}")))?;

        let query = format!(
            "{{\n  path as shortest(from: {from}, to: {to}, depth: {max_depth}) {{\n    {pred}\n  }}\n  result(func: uid(path)) {{\n    uid\n    {pred}\n  }}\n}}",
            pred = self.id_predicate(),
        );
        let data = self.run_read(query, HashMap::new()).await?;

        let mut path = Vec::new();
        if let Some(nodes) = data.get("result").and_then(Value::as_array) {
            for node in nodes {
                if let Some(id) = node.get(self.id_predicate().as_str()).and_then(Value::as_str) {
                    path.push(id.to_string());
                }
            }
        }
        Ok(path)
    }

    /// Enumerate connected components over nodes of the collection's type
    /// (or an explicit `node_type`). Each component is a list of stored ids.
    pub async fn find_connected_components(
        &self,
        node_type: Option<&str>,
    ) -> StorageResult<Vec<Vec<String>>> {
        let type_name = match node_type {
            Some(name) => omnistore_dao::ensure_valid_identifier(name, "type")?.to_string(),
            None => self.model_path().to_string(),
        };
        let id_pred = format!("{type_name}.id");
        let query = format!(
            "{{\n  nodes(func: type({type_name})) {{\n    uid\n    {id_pred}\n    expand(_all_) {{ uid }}\n  }}\n}}",
        );
        let data = self.run_read(query, HashMap::new()).await?;

        let Some(nodes) = data.get("nodes").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        // Adjacency over expanded uid references.
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut node_ids: HashMap<String, String> = HashMap::new();
        for node in nodes {
            let Some(node) = node.as_object() else { continue };
            let Some(uid) = node.get("uid").and_then(Value::as_str) else {
                continue;
            };
            let Some(node_id) = node.get(id_pred.as_str()).and_then(Value::as_str) else {
                continue;
            };
            node_ids.insert(uid.to_string(), node_id.to_string());
            let neighbors = adjacency.entry(uid.to_string()).or_default();
            for (key, value) in node {
                if key == "uid" {
                    continue;
                }
                match value {
                    Value::Array(items) => {
                        for item in items {
                            if let Some(neighbor) = item.get("uid").and_then(Value::as_str) {
                                neighbors.push(neighbor.to_string());
                            }
                        }
                    }
                    Value::Object(obj) => {
                        if let Some(neighbor) = obj.get("uid").and_then(Value::as_str) {
                            neighbors.push(neighbor.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        // Iterative DFS over the undirected view.
        let mut visited: HashSet<String> = HashSet::new();
        let mut components = Vec::new();
        for start in node_ids.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start.clone()];
            while let Some(uid) = stack.pop() {
                if !visited.insert(uid.clone()) {
                    continue;
                }
                if let Some(node_id) = node_ids.get(&uid) {
                    component.push(node_id.clone());
                }
                if let Some(neighbors) = adjacency.get(&uid) {
                    for neighbor in neighbors {
                        if node_ids.contains_key(neighbor) && !visited.contains(neighbor) {
                            stack.push(neighbor.clone());
                        }
                    }
                }
            }
            if !component.is_empty() {
                components.push(component);
            }
        }
        debug!(count = components.len(), "Connected components enumerated");
        Ok(components)
    }

    /// Count forward and reverse edges of a node.
    ///
    /// `direction` is `"in"`, `"out"`, or `"all"`; the result carries the
    /// requested counters (plus `total` for `"all"`).
    pub async fn get_node_degree(
        &self,
        node_id: &str,
        direction: &str,
    ) -> StorageResult<Document> {
        let query = format!(
            "query degree($id: string) {{\n  node(func: eq({pred}, $id)) @filter(type({collection})) {{\n    uid\n    {pred}\n    expand(_all_) {{ uid }}\n  }}\n}}",
            pred = self.id_predicate(),
            collection = self.model_path(),
        );
        let vars = HashMap::from([("$id".to_string(), node_id.to_string())]);
        let data = self.run_read(query, vars).await?;

        let node = data
            .get("node")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let id_pred = self.id_predicate();
        let mut in_degree = 0u64;
        let mut out_degree = 0u64;
        for (key, value) in &node {
            if key == "uid" || key == "dgraph.type" || *key == id_pred {
                continue;
            }
            let count = match value {
                Value::Array(items) => items
                    .iter()
                    .filter(|item| item.get("uid").is_some())
                    .count() as u64,
                Value::Object(obj) if obj.contains_key("uid") => 1,
                _ => 0,
            };
            if key.starts_with('~') {
                in_degree += count;
            } else {
                out_degree += count;
            }
        }

        let mut result = Document::new();
        match direction {
            "in" => {
                result.insert("in".into(), Value::from(in_degree));
            }
            "out" => {
                result.insert("out".into(), Value::from(out_degree));
            }
            _ => {
                result.insert("in".into(), Value::from(in_degree));
                result.insert("out".into(), Value::from(out_degree));
                result.insert("total".into(), Value::from(in_degree + out_degree));
            }
        }
        Ok(result)
    }
}
