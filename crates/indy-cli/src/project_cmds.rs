//! Handlers for `indy project` subcommands.

use anyhow::Result;
use sqlx::PgPool;

use indy_core::project::{self, CreateProject};
use indy_core::snapshot::{ProjectSnapshot, get_project_snapshot};
use indy_db::models::Project;

use crate::{ProjectCommands, print_json};

pub async fn run_project_command(
    command: ProjectCommands,
    pool: &PgPool,
    user: &str,
    json: bool,
) -> Result<()> {
    match command {
        ProjectCommands::Create {
            name,
            strategy,
            status,
            notes,
        } => {
            let input = CreateProject {
                name,
                status,
                strategy,
                notes,
                params: None,
            };
            let project = project::create_project(pool, user, &input).await?;
            if json {
                return print_json(&project);
            }
            println!("Project created.");
            println!();
            print_header(&project);
            Ok(())
        }
        ProjectCommands::List => {
            let projects = project::list_projects(pool, user).await?;
            if json {
                return print_json(&projects);
            }
            print_list(&projects);
            Ok(())
        }
        ProjectCommands::Show { project_id } => {
            let snapshot = get_project_snapshot(pool, user, project_id).await?;
            if json {
                return print_json(&snapshot);
            }
            print_snapshot(&snapshot);
            Ok(())
        }
        ProjectCommands::Status { project_id, status } => {
            let project = project::update_project_status(pool, user, project_id, status).await?;
            if json {
                return print_json(&project);
            }
            println!("Project {} is now {}.", project.id, project.status);
            Ok(())
        }
    }
}

fn print_header(project: &Project) {
    println!("  ID:        {}", project.id);
    println!("  Name:      {}", project.name);
    println!("  Status:    {}", project.status);
    println!("  Strategy:  {}", project.strategy);
    println!("  Updated:   {}", project.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if !project.notes.is_empty() {
        println!("  Notes:     {}", project.notes);
    }
}

fn print_list(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects found. Use `indy project create <name>` to create one.");
        return;
    }

    let name_w = projects.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
    println!("{:>6}  {:<name_w$}  {:<9}  {:<12}  UPDATED", "ID", "NAME", "STATUS", "STRATEGY");
    for p in projects {
        println!(
            "{:>6}  {:<name_w$}  {:<9}  {:<12}  {}",
            p.id,
            p.name,
            p.status,
            p.strategy,
            p.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

fn print_snapshot(snap: &ProjectSnapshot) {
    println!("Project: {}", snap.project.name);
    print_header(&snap.project);

    println!();
    println!("Tasks ({}):", snap.tasks.len());
    for task in &snap.tasks {
        let parent = task
            .parent_task_id
            .map(|id| format!(" <- {id}"))
            .unwrap_or_default();
        println!(
            "  [{}] #{}{} {} ({} x {})",
            task.status, task.id, parent, task.name, task.target_runs, task.activity
        );
    }

    println!();
    println!("Jobs ({}):", snap.jobs.len());
    for job in &snap.jobs {
        let window = match (job.started_at, job.finished_at) {
            (Some(start), Some(end)) => {
                format!("{} -> {}", start.format("%m-%d %H:%M"), end.format("%m-%d %H:%M"))
            }
            (Some(start), None) => format!("{} ->", start.format("%m-%d %H:%M")),
            _ => "unscheduled".to_owned(),
        };
        let task = job.task_id.map(|id| format!("#{id}")).unwrap_or_else(|| "-".to_owned());
        println!(
            "  [{}] job {} task {} runs {} cost {:.2} {}",
            job.status, job.id, task, job.runs, job.cost_isk, window
        );
    }

    if !snap.material_diff.is_empty() {
        println!();
        println!("Materials:");
        println!(
            "  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}",
            "TYPE", "REQUIRED", "STOCK", "BUY", "BUILD", "MISSING"
        );
        for d in &snap.material_diff {
            println!(
                "  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}",
                d.type_id, d.required_qty, d.available_qty, d.buy_qty, d.build_qty, d.missing_qty
            );
        }
    }

    if !snap.blueprints.is_empty() {
        println!();
        println!("Blueprints:");
        for bp in &snap.blueprints {
            let kind = if bp.is_bpo {
                "BPO".to_owned()
            } else {
                format!("BPC x{}", bp.available_runs)
            };
            let location = bp
                .location_id
                .map(|l| l.to_string())
                .unwrap_or_else(|| "any".to_owned());
            println!("  {} at {}: {}", bp.blueprint_type_id, location, kind);
        }
    }
}
