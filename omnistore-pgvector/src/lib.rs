//! # omnistore-pgvector — vector adapter
//!
//! Stores entities as JSONB documents beside an embedding column in a
//! PostgreSQL with the vector extension, and ranks them by cosine distance.
//! The embedding model itself is opaque: anything implementing [`Embedder`]
//! works, and CPU-bound embedding can be pushed onto a worker pool with
//! [`PooledEmbedder`].

pub mod dao;
pub mod embedding;

pub use dao::PgVectorDao;
pub use embedding::{cosine_distance, document_text, Embedder, HashEmbedder, PooledEmbedder};
