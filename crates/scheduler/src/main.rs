mod active_hours;
mod scheduler;

use std::sync::Arc;

use anyhow::Result;
use common::{Config, CrawlerError};
use orchestrator::Pipeline;
use scheduler::CycleScheduler;
use time::OffsetDateTime;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

async fn run_gated_cycle(pipeline: &Pipeline, active_hours: (u8, u8)) -> Result<()> {
    if !active_hours::within_active_hours(OffsetDateTime::now_utc(), active_hours) {
        info!(
            "Outside active hours ({}:00-{}:00 ET), skipping",
            active_hours.0, active_hours.1
        );
        return Ok(());
    }

    match pipeline.run_scheduled().await {
        Ok(report) => {
            info!("Cycle report: {}", serde_json::to_string(&report)?);
            Ok(())
        }
        Err(CrawlerError::Busy) => {
            info!("Previous cycle still running, skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
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

    let config = Config::from_env()?;
    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let active_hours = config.schedule.active_hours;

    let mut scheduler = CycleScheduler::new().await?;
    scheduler
        .add_cron_job(&config.schedule.cron, move || {
            let pipeline = pipeline.clone();
            async move { run_gated_cycle(&pipeline, active_hours).await }
        })
        .await?;

    info!(
        cron = %config.schedule.cron,
        "Scheduler configured; active {}:00-{}:00 ET",
        active_hours.0,
        active_hours.1
    );
    info!("Press Ctrl+C to stop the scheduler");

    tokio::select! {
        _ = scheduler.run_forever() => {
            info!("Scheduler stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal, shutting down...");
        }
    }
    scheduler.shutdown().await?;

    Ok(())
}
