mod config;
mod job_cmds;
mod plan_cmds;
mod project_cmds;
mod stock_cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::PgPool;

use indy_db::models::{JobStatus, ProjectStatus, Strategy};
use indy_db::pool;

use config::IndyConfig;

#[derive(Parser)]
#[command(name = "indy", about = "Industry project planner and production scheduler")]
struct Cli {
    /// Database URL (overrides INDY_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// User key to act as (overrides INDY_USER env var)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an indy config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/indy")]
        db_url: String,
        /// Default user key for every command
        #[arg(long)]
        user: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Apply or preview plan patches
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Job status changes
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Show the job ledger across projects
    Ledger {
        /// Only jobs of this project
        #[arg(long)]
        project: Option<i64>,
        /// Only jobs in this status
        #[arg(long)]
        status: Option<JobStatus>,
        /// Page size (default 200, max 1000)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Material planning
    Materials {
        #[command(subcommand)]
        command: MaterialCommands,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a new project
    Create {
        name: String,
        /// conservative, balanced or aggressive
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Initial status (default draft)
        #[arg(long)]
        status: Option<ProjectStatus>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List your projects
    List,
    /// Show a project with its tasks, jobs, materials and blueprints
    Show { project_id: i64 },
    /// Change a project's status
    Status {
        project_id: i64,
        status: ProjectStatus,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Apply a patch file (.json or .toml) to a project
    Apply { project_id: i64, file: String },
    /// Show what applying a patch would do, without writing
    Preview { project_id: i64, file: String },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Set the status of one or more jobs (all or nothing)
    Status {
        #[arg(required = true)]
        job_ids: Vec<i64>,
        #[arg(long)]
        status: String,
        /// RFC3339 start time
        #[arg(long)]
        started_at: Option<String>,
        /// RFC3339 finish time (terminal statuses only)
        #[arg(long)]
        finished_at: Option<String>,
        /// Replace the job notes
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MaterialCommands {
    /// Re-split a project's materials against a stock snapshot (JSON file)
    Rebalance {
        project_id: i64,
        stock_file: String,
        /// global, prefer_location or strict_location
        #[arg(long, default_value = "prefer_location")]
        scope: String,
        /// buy, build or preserve
        #[arg(long, default_value = "preserve")]
        strategy: String,
    },
}

/// Pretty-print any result as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute the `indy init` command: write config file.
fn cmd_init(db_url: &str, user: Option<String>, force: bool) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_owned(),
        },
        defaults: config::DefaultsSection { user },
    };
    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(user) = &cfg.defaults.user {
        println!("  defaults.user = {user}");
    }
    println!();
    println!("Next: run `indy db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `indy db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &IndyConfig) -> Result<()> {
    println!("Initializing indy database...");

    let db_pool = pool::connect_and_migrate(&resolved.db_config).await?;
    tracing::info!("migrations applied");

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;
    Ok(())
}

async fn run_data_command(command: Commands, pool: &PgPool, user: &str, json: bool) -> Result<()> {
    match command {
        Commands::Project { command } => {
            project_cmds::run_project_command(command, pool, user, json).await
        }
        Commands::Plan { command } => plan_cmds::run_plan_command(command, pool, user, json).await,
        Commands::Job { command } => job_cmds::run_job_command(command, pool, user, json).await,
        Commands::Ledger {
            project,
            status,
            limit,
        } => job_cmds::run_ledger(pool, user, project, status, limit, json).await,
        Commands::Materials { command } => {
            stock_cmd::run_material_command(command, pool, user, json).await
        }
        Commands::Init { .. } | Commands::DbInit => {
            anyhow::bail!("init commands run without a database connection")
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let resolved = IndyConfig::resolve(cli.database_url.as_deref(), cli.user.as_deref());

    match cli.command {
        Commands::Init { db_url, user, force } => cmd_init(&db_url, user, force),
        Commands::DbInit => cmd_db_init(&resolved).await,
        command => {
            let user = resolved.user()?;
            tracing::debug!(user, "connecting to database");
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = run_data_command(command, &db_pool, user, cli.json).await;
            db_pool.close().await;
            result
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
