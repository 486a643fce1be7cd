mod config;
mod log_cmd;
mod onboard_cmd;
mod retry_cmd;
mod serve_cmd;
mod status_cmd;
mod watch_cmd;

#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use cadence_core::generator::TemplateGenerator;
use cadence_core::worker::GenerationWorker;
use cadence_db::pool;

use config::CadenceConfig;

#[derive(Parser)]
#[command(name = "cadence", about = "Multi-week training plan generation pipeline")]
struct Cli {
    /// Database URL (overrides CADENCE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a cadence config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/cadence")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the cadence database (requires config file or env vars)
    DbInit,
    /// Create a plan from a TOML onboarding file and start generation
    Onboard {
        /// Path to the onboarding TOML file
        file: String,
        /// Stay attached until background generation finishes
        #[arg(long)]
        follow: bool,
    },
    /// Show plan progress and per-week status
    Status {
        /// User ID to show status for
        user_id: String,
    },
    /// Retry a single errored week and wait for the result
    Retry {
        /// User ID owning the plan
        user_id: String,
        /// Week number to retry
        week: i32,
    },
    /// Poll plan status until generation settles (auto-retries errors once)
    Watch {
        /// User ID to watch
        user_id: String,
        /// Polling interval in seconds
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
    /// Show the generation audit log for a user
    Log {
        /// User ID to show attempts for
        user_id: String,
        /// Maximum number of entries to print
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Run the HTTP status and retry API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

/// Execute the `cadence init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        generation: config::GenerationSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `cadence db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `cadence db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = CadenceConfig::resolve(cli_db_url)?;

    println!("Initializing cadence database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("cadence db-init complete.");
    Ok(())
}

/// Build the shared worker used by every command that generates.
fn make_worker(db_pool: sqlx::PgPool, resolved: &CadenceConfig) -> Arc<GenerationWorker> {
    Arc::new(GenerationWorker::new(
        db_pool,
        Arc::new(TemplateGenerator),
        resolved.worker_config.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Onboard { file, follow } => {
            let resolved = CadenceConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = make_worker(db_pool.clone(), &resolved);
            let result = onboard_cmd::run_onboard(&worker, &file, follow).await;
            db_pool.close().await;
            result?;
        }
        Commands::Status { user_id } => {
            let resolved = CadenceConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = status_cmd::run_status(&db_pool, &user_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Retry { user_id, week } => {
            let resolved = CadenceConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = make_worker(db_pool.clone(), &resolved);
            let result = retry_cmd::run_retry(&worker, &user_id, week).await;
            db_pool.close().await;
            result?;
        }
        Commands::Watch { user_id, interval } => {
            let resolved = CadenceConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = make_worker(db_pool.clone(), &resolved);
            let result = watch_cmd::run_watch(&worker, &user_id, interval).await;
            db_pool.close().await;
            result?;
        }
        Commands::Log { user_id, limit } => {
            let resolved = CadenceConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = log_cmd::run_log(&db_pool, &user_id, limit).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = CadenceConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let worker = make_worker(db_pool.clone(), &resolved);
            let result = serve_cmd::run_serve(worker, &bind, port).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
