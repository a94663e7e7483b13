//! Text-to-vector integration.
//!
//! The model is treated as an opaque function `text → vector`. The default
//! [`HashEmbedder`] is a deterministic hashed bag-of-words, enough to make
//! similarity ranking meaningful in tests and air-gapped deployments; real
//! deployments plug in an actual model behind the same trait.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use omnistore_core::{StorageError, StorageResult};
use omnistore_model::entity::Document;
use omnistore_workers::{TaskOptions, TaskPayload, ThreadBackend, WorkerPool};

/// An opaque text-to-vector function.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> StorageResult<Vec<f32>>;
}

/// Deterministic hashed bag-of-words embedder.
///
/// Tokens hash into buckets; the vector is L2-normalized. Empty input yields
/// the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Synchronous embedding; also used by [`PooledEmbedder`] tasks.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut any = false;
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
            any = true;
        }
        if !any {
            return vector;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        // Matches the default embedding column width.
        Self::new(768)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> StorageResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

/// Embedder that runs the CPU-bound encoding on a worker pool.
pub struct PooledEmbedder {
    inner: Arc<HashEmbedder>,
    pool: WorkerPool<ThreadBackend>,
    timeout: Duration,
}

impl PooledEmbedder {
    pub fn new(inner: HashEmbedder, pool: WorkerPool<ThreadBackend>) -> Self {
        Self {
            inner: Arc::new(inner),
            pool,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Embedder for PooledEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> StorageResult<Vec<f32>> {
        let embedder = Arc::clone(&self.inner);
        let text = text.to_string();
        let payload = TaskPayload::closure(move |_ctx| {
            let vector = embedder.embed_sync(&text);
            serde_json::to_value(vector).map_err(|e| e.to_string())
        });
        let task_id = self
            .pool
            .submit(payload, TaskOptions::default())
            .map_err(|e| StorageError::backend(e))?;
        let value = self
            .pool
            .get_result(&task_id, Some(self.timeout))
            .await
            .map_err(|e| StorageError::backend(e))?;
        serde_json::from_value(value).map_err(|e| StorageError::Validation(e.to_string()))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Assemble the embeddable text of a document: `key: value` pairs for string
/// fields, list items flattened, nested maps recursed.
pub fn document_text(doc: &Document) -> String {
    let mut parts = Vec::new();
    collect_text(doc, &mut parts);
    parts.join(" ")
}

fn collect_text(doc: &Document, parts: &mut Vec<String>) {
    for (key, value) in doc {
        match value {
            Value::String(s) => parts.push(format!("{key}: {s}")),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => parts.push(s.clone()),
                        Value::Object(nested) => {
                            if let Some(Value::String(text)) = nested.get("text") {
                                parts.push(text.clone());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Value::Object(nested) => collect_text(nested, parts),
            _ => {}
        }
    }
}

/// Cosine distance (1 − cosine similarity); 1.0 for degenerate inputs.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn empty_input_yields_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let vector = embedder.embed_sync("");
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_sync("neural networks and deep learning");
        let b = embedder.embed_sync("neural networks and deep learning");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_tokens_rank_closer_than_disjoint_text() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_sync("deep learning frameworks");
        let related = embedder.embed_sync("neural networks and deep learning");
        let unrelated = embedder.embed_sync("gardening tips for spring");
        assert!(
            cosine_distance(&query, &related) < cosine_distance(&query, &unrelated),
            "overlapping text should rank closer"
        );
    }

    #[test]
    fn document_text_joins_fields_and_recurses() {
        let text = document_text(&doc(json!({
            "title": "T",
            "tags": ["a", "b"],
            "meta": {"author": "alice"},
            "count": 3
        })));
        assert_eq!(text, "title: T a b author: alice");
    }

    #[test]
    fn document_text_of_empty_document_is_empty() {
        assert!(document_text(&Document::new()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pooled_embedder_matches_inline_embedding() {
        let pool = WorkerPool::new(
            omnistore_workers::PoolSettings::named("embed")
                .workers(1, 2)
                .warm_workers(0)
                .hibernation(false, Duration::from_secs(60))
                .health_check_interval(Duration::ZERO),
            ThreadBackend::default(),
        );
        pool.initialize().await.unwrap();

        let inline = HashEmbedder::new(32).embed_sync("some text");
        let pooled = PooledEmbedder::new(HashEmbedder::new(32), pool.clone());
        let via_pool = pooled.embed("some text").await.unwrap();
        assert_eq!(inline, via_pool);
        pool.shutdown().await;
    }
}
