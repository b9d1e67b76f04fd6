use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Config, MemoryStore};
use orchestrator::{admin, AdminState, Pipeline, RunMode};
use rankings::ArtifactPaths;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "orchestrator", about = "Scrape weekly fantasy rankings and publish them when they change")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Publish into an in-memory store instead of the configured repository.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run one freshness-gated cycle (default).
    Run,
    /// Scrape and publish regardless of the freshness token.
    Force,
    /// Serve the admin trigger over HTTP.
    Serve,
}

fn build_pipeline(config: &Config, dry_run: bool) -> Result<Pipeline> {
    if dry_run {
        info!("Dry run: publishing to an in-memory store");
        let max_backups = config.store.as_ref().map(|s| s.max_backups).unwrap_or(30);
        return Pipeline::with_store(
            config,
            Arc::new(MemoryStore::new()),
            ArtifactPaths::default(),
            max_backups,
        );
    }
    Pipeline::from_config(config)
}

async fn run_once(pipeline: &Pipeline, mode: RunMode) -> Result<()> {
    match pipeline.run(mode).await {
        Ok(report) => {
            info!("Cycle report: {}", serde_json::to_string(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(kind = e.kind(), "Cycle failed: {}", e);
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    let _ = dotenv::dotenv();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        monitor = config.monitor_url.as_deref().unwrap_or("<none>"),
        urls = config.total_urls(),
        "Configuration loaded"
    );

    let pipeline = build_pipeline(&config, cli.dry_run)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_once(&pipeline, RunMode::Scheduled).await,
        Command::Force => run_once(&pipeline, RunMode::Forced).await,
        Command::Serve => {
            if config.admin_secret.is_none() {
                tracing::warn!("ADMIN_SECRET is not set; every trigger request will be rejected");
            }
            let state = AdminState::new(Arc::new(pipeline), config.admin_secret.as_deref());
            admin::serve(state, &config.admin_bind).await
        }
    }
}
