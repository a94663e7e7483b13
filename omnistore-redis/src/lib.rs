//! # omnistore-redis — cache adapter
//!
//! Entities live under namespaced keys (`{collection}:{id}`) with a
//! companion metadata hash (`{collection}:meta:{id}`) and per-indexed-field
//! sets (`{collection}:idx:{field}:{value}`) for constant-time filter
//! lookups. Entries default to a 24-hour TTL, overridable per record via the
//! `_ttl` field.

pub mod dao;

pub use dao::RedisDao;
