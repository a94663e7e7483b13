//! # omnistore-dgraph — graph adapter
//!
//! Talks to a Dgraph-style graph store over its native gRPC API. When the
//! graph binding is the primary, the UID this adapter returns from `create`
//! becomes the entity's cross-backend correlator (`graph_id`).
//!
//! Entity fields are stored as prefixed predicates (`{collection}.{field}`);
//! list and map fields are serialized to JSON strings inside single
//! predicates. The trade: round-trips stay lossless, but graph-native
//! traversal over those values is not available.

pub mod client;
pub mod dao;
pub mod graph;
pub mod proto;

pub use client::DgraphClient;
pub use dao::DgraphDao;
