use anyhow::Result;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub struct CycleScheduler {
    scheduler: JobScheduler,
}

impl CycleScheduler {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self { scheduler })
    }

    /// Registers `job_fn` on a six-field cron expression (seconds first).
    pub async fn add_cron_job<F, Fut>(&mut self, cron_expression: &str, job_fn: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        info!("Scheduling rankings check with cron: {}", cron_expression);

        let job_fn = Arc::new(job_fn);
        let job = Job::new_async(cron_expression, move |_uuid, _l| {
            let job_fn = job_fn.clone();
            Box::pin(async move {
                info!("Scheduled check firing at {}", OffsetDateTime::now_utc());
                if let Err(e) = job_fn().await {
                    error!("Scheduled check failed: {}", e);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        info!("Starting scheduler...");
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down scheduler...");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    pub async fn run_forever(&self) -> Result<()> {
        self.start().await?;

        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
        }
    }
}
