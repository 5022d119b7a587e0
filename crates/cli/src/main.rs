mod config;
mod samples;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migrator_core::RunRequest;
use orchestrator::activities::discover_ordered;
use orchestrator::{MigrationWorkflow, VersionSequencer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use substrate::{LocalSubstrate, RunHistory};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{WorkerConfig, CONFIG_FILE, DATA_DIR, MIGRATOR_DIR};

#[derive(Parser)]
#[command(name = "migrator")]
#[command(about = "Run versioned migrations on a durable substrate", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file; defaults to .migrator/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the ledger
    Init,
    /// Execute a bootstrap run, or resume it when the run id already exists
    Run {
        #[arg(long)]
        run_id: Option<String>,
        /// Release a run left running by a worker that stopped, then resume it
        #[arg(long, requires = "run_id")]
        take_over: bool,
    },
    /// Show the ledger entries of a run
    Status {
        #[arg(long)]
        run_id: String,
    },
    /// Show the migration catalog in execution order
    List,
    /// Show top-level runs, newest first
    Runs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| Path::new(MIGRATOR_DIR).join(CONFIG_FILE));

    init_tracing();

    match cli.command {
        Commands::Init => init(&config_path).await,
        Commands::Run { run_id, take_over } => run(&config_path, run_id, take_over).await,
        Commands::Status { run_id } => status(&config_path, &run_id).await,
        Commands::List => list(&config_path).await,
        Commands::Runs => runs(&config_path).await,
    }
}

async fn init(config_path: &Path) -> Result<()> {
    if tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        println!("Already initialized: {}", config_path.display());
        return Ok(());
    }

    let config = WorkerConfig::default();
    config.save(config_path).await?;
    connect(&config, config_path).await?;

    println!("Initialized migrator");
    println!("  config: {}", config_path.display());
    println!("  ledger: {}", config.substrate.database_url);
    Ok(())
}

async fn run(config_path: &Path, run_id: Option<String>, take_over: bool) -> Result<()> {
    let config = WorkerConfig::load(config_path).await?;
    let substrate = connect(&config, config_path).await?;
    let run_id = run_id.unwrap_or_else(|| substrate.new_run_id());

    if take_over {
        let released = substrate
            .take_over(&run_id)
            .await
            .with_context(|| format!("Failed to take over run {}", run_id))?;
        println!("Released {} running record(s) of {}", released, run_id);
    }

    println!("Run {}", run_id);
    let handle = substrate.start(run_id.clone(), RunRequest::bootstrap());
    let cancellation = handle.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            cancellation.cancel();
        }
    });

    let outcome = handle.join().await;
    interrupt.abort();

    if let Ok(history) = substrate.history(&run_id).await {
        print_history(&history);
    }
    outcome.with_context(|| format!("Run {} did not complete", run_id))
}

async fn status(config_path: &Path, run_id: &str) -> Result<()> {
    let config = WorkerConfig::load(config_path).await?;
    let substrate = connect(&config, config_path).await?;
    let history = substrate
        .history(run_id)
        .await
        .with_context(|| format!("No ledger entry for run {}", run_id))?;

    print_history(&history);
    Ok(())
}

async fn list(config_path: &Path) -> Result<()> {
    let config = WorkerConfig::load(config_path).await?;
    let registry = samples::registry(&data_dir(config_path));
    let ordered = discover_ordered(
        &registry,
        &config.orchestrator.scope,
        VersionSequencer::new(config.orchestrator.tie_break),
    )?;

    if ordered.is_empty() {
        println!("No migrations registered.");
        return Ok(());
    }

    println!("Migrations ({}):", ordered.len());
    for (position, identity) in ordered.iter().enumerate() {
        println!(
            "  {:>3}. {:<24} {}",
            position + 1,
            identity.short_name(),
            identity
        );
    }
    Ok(())
}

async fn runs(config_path: &Path) -> Result<()> {
    let config = WorkerConfig::load(config_path).await?;
    let substrate = connect(&config, config_path).await?;
    let runs = substrate.runs().await?;

    if runs.is_empty() {
        println!("No runs yet.");
        return Ok(());
    }

    for run in &runs {
        println!(
            "  {} [{}] {} (attempts: {})",
            status_icon(run.status.as_str()),
            run.status,
            run.run_id,
            run.attempts
        );
    }
    Ok(())
}

async fn connect(config: &WorkerConfig, config_path: &Path) -> Result<LocalSubstrate> {
    let registry = Arc::new(samples::registry(&data_dir(config_path)));
    let workflow = Arc::new(MigrationWorkflow::new(registry, config.orchestrator.clone()));

    LocalSubstrate::connect(config.substrate.clone(), workflow)
        .await
        .with_context(|| format!("Failed to open ledger {}", config.substrate.database_url))
}

/// Sample migrations keep their files next to the config file.
fn data_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(DATA_DIR)
}

fn print_history(history: &RunHistory) {
    let run = &history.run;
    println!();
    println!("Run:      {}", run.run_id);
    println!("Kind:     {}", run.request.kind);
    println!("Status:   {} (attempts: {})", run.status, run.attempts);
    if let Some(ref error) = run.error {
        println!("Error:    {}", error);
    }
    println!("Updated:  {}", run.updated_at.to_rfc3339());

    if !history.children.is_empty() {
        println!();
        println!("Migrations ({}):", history.children.len());
        for child in &history.children {
            println!(
                "  {} [{}] {} (attempts: {})",
                status_icon(child.status.as_str()),
                child.status,
                child.run_id,
                child.attempts
            );
        }
    }
    println!();
}

fn status_icon(status: &str) -> &'static str {
    match status {
        "running" => "◐",
        "completed" => "●",
        "failed" => "✗",
        _ => "?",
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
