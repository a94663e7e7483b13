//! # omnistore-postgres — relational adapter with dynamic schema
//!
//! Creates tables on first write by inferring column types from the payload,
//! and evolves them with `ALTER TABLE ADD COLUMN` as new fields appear.
//! Legacy tables carrying a catch-all `data` JSONB column keep working.

pub mod dao;
pub mod schema;

pub use dao::PostgresDao;
