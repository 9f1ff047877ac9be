//! Planning and production-scheduling engine.
//!
//! Entry points:
//!
//! - [`project::create_project`], [`project::update_project_status`]
//! - [`plan::apply_plan`] and [`plan::preview_plan`]
//! - [`snapshot::get_project_snapshot`]
//! - [`jobs::update_job_status`] and [`jobs::update_job_statuses`]
//! - [`stock::rebalance_materials_from_stock`]
//! - [`ledger::get_ledger`]
//!
//! Everything is scoped by an opaque user key. The resolver, gate,
//! scheduler and allocator are synchronous and touch no storage.

pub mod constraints;
pub mod draft;
pub mod error;
pub mod forest;
pub mod gate;
pub mod jobs;
pub mod ledger;
pub mod plan;
pub mod project;
pub mod resolve;
pub mod scheduler;
pub mod snapshot;
pub mod stock;

pub use error::{EngineError, EngineResult};
