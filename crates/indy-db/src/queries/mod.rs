//! Query functions, one module per table.
//!
//! Single-statement functions are generic over [`sqlx::PgExecutor`] so the
//! same call works against a pool or inside a transaction (`&mut *tx`).

pub mod blueprints;
pub mod jobs;
pub mod ledger;
pub mod materials;
pub mod projects;
pub mod tasks;
