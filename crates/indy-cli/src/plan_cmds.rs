//! Handlers for `indy plan` subcommands.
//!
//! - `indy plan apply <project-id> <file>`   -- apply a patch in one transaction
//! - `indy plan preview <project-id> <file>` -- dry run, nothing is written

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;

use indy_core::plan::{PlanPatch, PlanSummary, apply_plan, preview_plan};

use crate::{PlanCommands, print_json};

pub async fn run_plan_command(
    command: PlanCommands,
    pool: &PgPool,
    user: &str,
    json: bool,
) -> Result<()> {
    match command {
        PlanCommands::Apply { project_id, file } => {
            let patch = load_patch(Path::new(&file))?;
            let summary = apply_plan(pool, user, project_id, &patch).await?;
            if json {
                return print_json(&summary);
            }
            println!("Plan applied to project {project_id}.");
            println!();
            print_summary(&summary);
            Ok(())
        }
        PlanCommands::Preview { project_id, file } => {
            let patch = load_patch(Path::new(&file))?;
            let preview = preview_plan(pool, user, project_id, &patch).await?;
            if json {
                return print_json(&preview);
            }
            println!("Preview for project {project_id} (nothing written).");
            println!();
            print_summary(&preview.summary);
            if !preview.jobs.is_empty() {
                println!();
                println!("Jobs:");
                for job in &preview.jobs {
                    let task = job
                        .task_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_owned());
                    let start = job
                        .started_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "deferred".to_owned());
                    println!(
                        "  task {task:>4}  {:<9} runs {:>5}  {:>8}s  start {start}",
                        job.status, job.runs, job.duration_seconds
                    );
                }
            }
            Ok(())
        }
    }
}

/// Read a patch file. `.toml` files are parsed as TOML, anything else as
/// JSON.
pub fn load_patch(path: &Path) -> Result<PlanPatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read patch file: {}", path.display()))?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let patch = if is_toml {
        PlanPatch::from_toml(&content)
    } else {
        PlanPatch::from_json(&content)
    };
    patch.with_context(|| format!("invalid patch file: {}", path.display()))
}

fn print_summary(summary: &PlanSummary) {
    println!("  Tasks inserted:      {}", summary.tasks_inserted);
    println!("  Jobs inserted:       {}", summary.jobs_inserted);
    println!("  Materials upserted:  {}", summary.materials_upserted);
    println!("  Blueprints upserted: {}", summary.blueprints_upserted);
    if summary.scheduler_applied {
        println!(
            "  Runs:                {} total, {} scheduled, {} deferred ({} job(s))",
            summary.total_runs, summary.scheduled_runs, summary.deferred_runs, summary.deferred_jobs
        );
    } else {
        println!("  Runs:                {}", summary.total_runs);
    }
    if let Some(status) = summary.project_status {
        println!("  Project status:      {status}");
    }

    if !summary.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &summary.warnings {
            println!("  - {w}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_patch_is_read_by_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("patch.TOML");
        std::fs::write(
            &path,
            "replace = true\n\n[[tasks]]\nname = \"hulls\"\ntarget_runs = 5\n",
        )
        .unwrap();

        let patch = load_patch(&path).unwrap();
        assert!(patch.replace);
        assert_eq!(patch.tasks[0].name, "hulls");
        assert_eq!(patch.tasks[0].target_runs, 5);
    }

    #[test]
    fn other_extensions_are_json() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("patch.txt");
        std::fs::write(&path, r#"{"jobs": [{"runs": 2, "status": "queued"}]}"#).unwrap();

        let patch = load_patch(&path).unwrap();
        assert_eq!(patch.jobs.len(), 1);
        assert_eq!(patch.jobs[0].runs, 2);
    }

    #[test]
    fn invalid_patch_names_the_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"tasks": [{"name": ""}]}"#).unwrap();

        let err = format!("{:#}", load_patch(&path).unwrap_err());
        assert!(err.contains("bad.json"), "got {err}");
        assert!(err.contains("name is required"), "got {err}");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_patch(Path::new("/nonexistent/patch.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read patch file"));
    }
}
