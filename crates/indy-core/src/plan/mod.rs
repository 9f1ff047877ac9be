//! Plan orchestration: patch format, apply and preview.

pub mod apply;
pub mod engine;
pub mod patch;
pub mod preview;

pub use apply::apply_plan;
pub use engine::PlanSummary;
pub use patch::{BlueprintInput, JobInput, MaterialInput, PatchError, PlanPatch, TaskInput};
pub use preview::{PlanPreview, TaskDraft, preview_plan};
