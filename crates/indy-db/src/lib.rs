//! Entity store for the indy planning engine.
//!
//! Row models, embedded migrations, connection pooling, and per-table query
//! functions. Every query is scoped by an opaque user key: a row owned by a
//! different user is indistinguishable from a missing row.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
