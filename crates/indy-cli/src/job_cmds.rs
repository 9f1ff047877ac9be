//! Handlers for `indy job` and `indy ledger`.

use anyhow::Result;
use sqlx::PgPool;

use indy_core::jobs::{JobStatusUpdate, update_job_statuses};
use indy_core::ledger::{LedgerQuery, get_ledger};
use indy_db::models::JobStatus;

use crate::{JobCommands, print_json};

pub async fn run_job_command(
    command: JobCommands,
    pool: &PgPool,
    user: &str,
    json: bool,
) -> Result<()> {
    match command {
        JobCommands::Status {
            job_ids,
            status,
            started_at,
            finished_at,
            notes,
        } => {
            let update = JobStatusUpdate {
                status,
                started_at,
                finished_at,
                notes,
            };
            let jobs = update_job_statuses(pool, user, &job_ids, &update).await?;
            if json {
                return print_json(&jobs);
            }
            for job in &jobs {
                println!("Job {} is now {}.", job.id, job.status);
            }
            Ok(())
        }
    }
}

pub async fn run_ledger(
    pool: &PgPool,
    user: &str,
    project_id: Option<i64>,
    status: Option<JobStatus>,
    limit: Option<i64>,
    json: bool,
) -> Result<()> {
    let query = LedgerQuery {
        project_id,
        status,
        limit,
    };
    let ledger = get_ledger(pool, user, &query).await?;
    if json {
        return print_json(&ledger);
    }

    if ledger.entries.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<20}  {:<20}  {:<9}  {:>5}  {:>14}  UPDATED",
        "ID", "PROJECT", "TASK", "STATUS", "RUNS", "COST"
    );
    for e in &ledger.entries {
        println!(
            "{:>6}  {:<20}  {:<20}  {:<9}  {:>5}  {:>14.2}  {}",
            e.id,
            truncate(&e.project_name, 20),
            truncate(e.task_name.as_deref().unwrap_or("-"), 20),
            e.status,
            e.runs,
            e.cost_isk,
            e.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }

    println!();
    for t in &ledger.totals {
        println!("  {:<9} {:>6} job(s)  {:>16.2} ISK", t.status, t.jobs, t.cost_isk);
    }
    println!(
        "  {:<9} {:>6} job(s)  {:>16.2} ISK",
        "total", ledger.total_jobs, ledger.total_cost_isk
    );
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}
