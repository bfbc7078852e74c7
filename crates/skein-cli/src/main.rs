use clap::{Parser, Subcommand};
use serde::Deserialize;
use skein_agent::{AgentContext, AgentRegistry};
use skein_provider::ProviderRegistry;
use skein_scheduler::{ops, SchedulerConfig, SchedulerService};
use skein_store::{RunStore, SqliteLockStore, SqliteRunStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "skein", about = "Skein — pipeline orchestration runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "skein.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recent run records
    Runs {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Mark a still-running record as cancelled
    Cancel {
        /// Run record id
        run_id: Uuid,
    },
    /// Force-fail records stuck in the running state
    Sweep,
    /// Show configured pipelines, locks, and in-flight runs
    Status,
    /// Check the configuration for problems
    Validate,
}

#[derive(Deserialize)]
struct SkeinConfig {
    #[serde(default = "default_database")]
    database: PathBuf,
    #[serde(default)]
    scheduler: SchedulerConfig,
}

fn default_database() -> PathBuf {
    PathBuf::from("./data/skein.db")
}

impl SkeinConfig {
    fn load(path: &PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(config = %path.display(), "Config file not found, using defaults");
            return Ok(Self {
                database: default_database(),
                scheduler: SchedulerConfig::default(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Ok(toml::from_str(&raw)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SkeinConfig::load(&cli.config)?;

    match cli.command {
        Commands::Runs { limit } => {
            let runs = SqliteRunStore::open(&config.database)?;
            let records = runs.recent(limit).await?;
            if records.is_empty() {
                println!("No runs recorded.");
                return Ok(());
            }
            for record in records {
                println!(
                    "{}  {:<10} {}/{} ({})  {}",
                    record.started_at.format("%Y-%m-%d %H:%M:%S"),
                    record.status,
                    record.pipeline,
                    record.agent_name,
                    record.trigger,
                    record.summary.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Cancel { run_id } => {
            let runs = SqliteRunStore::open(&config.database)?;
            let record = ops::cancel_run(&runs, run_id).await?;
            println!(
                "Cancelled run {} ({}/{})",
                record.id, record.pipeline, record.agent_name
            );
        }
        Commands::Sweep => {
            let runs = SqliteRunStore::open(&config.database)?;
            let closed =
                ops::sweep_stale_runs(&runs, config.scheduler.stale_after_minutes).await?;
            println!("Closed {closed} stale run(s).");
        }
        Commands::Status => {
            let runs = Arc::new(SqliteRunStore::open(&config.database)?);
            let locks = Arc::new(SqliteLockStore::open(&config.database)?);
            let context = AgentContext::new(Arc::new(ProviderRegistry::new()), runs);
            let service = SchedulerService::new(
                Arc::new(AgentRegistry::new()),
                context,
                locks,
                config.scheduler,
            );
            let status = service.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Validate => {
            let mut issues = Vec::new();
            let mut seen = std::collections::HashSet::new();
            for entry in &config.scheduler.pipelines {
                if let Err(e) = SchedulerService::parse_cron(&entry.cron) {
                    issues.push(e.to_string());
                }
                if !seen.insert(entry.pipeline.clone()) {
                    issues.push(format!(
                        "pipeline '{}' has more than one schedule entry",
                        entry.pipeline
                    ));
                }
                if entry.lock_ttl_secs == 0 {
                    issues.push(format!(
                        "pipeline '{}' has a zero lock TTL",
                        entry.pipeline
                    ));
                }
            }

            if issues.is_empty() {
                println!(
                    "Configuration OK ({} pipeline(s) scheduled).",
                    config.scheduler.pipelines.len()
                );
            } else {
                for issue in &issues {
                    eprintln!("error: {issue}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
