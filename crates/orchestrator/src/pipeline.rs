use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::http::build_client;
use common::{
    ArtifactStore, Config, CrawlerError, CrawlerResult, GithubStoreClient, Notifier, Position,
    UpdateNotification,
};
use rankings::{
    week_number, ArtifactPaths, ChangeDetector, HttpFetcher, PublishOutcome, PublishPipeline,
    RankingsAggregator, RankingsSnapshot, ScrapeTrigger,
};
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Gated by the freshness token and the content sample.
    Scheduled,
    /// Scrapes and publishes unconditionally.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleStatus {
    Updated,
    NoOp,
    Skipped,
}

/// Structured result of one cycle, returned by the admin trigger and logged by the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub status: CycleStatus,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_token: Option<String>,
    pub total_players: usize,
    pub counts: BTreeMap<Position, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<u8>,
}

impl CycleReport {
    fn without_scrape(
        status: CycleStatus,
        reason: &str,
        token: Option<String>,
        published: Option<&RankingsSnapshot>,
    ) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            current_token: token,
            total_players: published.map(RankingsSnapshot::total_players).unwrap_or(0),
            counts: published.map(RankingsSnapshot::counts).unwrap_or_default(),
            version: None,
            backup: None,
            method: None,
            week: published.map(RankingsSnapshot::week),
        }
    }

    fn after_publish(outcome: PublishOutcome, snapshot: &RankingsSnapshot, token: Option<String>) -> Self {
        let (status, reason) = if outcome.written {
            (CycleStatus::Updated, "published")
        } else {
            (CycleStatus::NoOp, "rankings-unchanged")
        };
        Self {
            status,
            reason: reason.to_string(),
            current_token: token,
            total_players: snapshot.total_players(),
            counts: snapshot.counts(),
            version: outcome.version,
            backup: outcome.backup_path,
            method: Some(snapshot.method().to_string()),
            week: Some(snapshot.week()),
        }
    }
}

/// Everything the pipeline needs that is plain data.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub monitor_url: Option<String>,
    /// Takes precedence over the token persisted in the store.
    pub last_known_token: Option<String>,
    pub position_urls: BTreeMap<Position, Vec<String>>,
    pub run_deadline: Duration,
    pub season_start: Date,
    pub week_override: Option<u8>,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            monitor_url: config.monitor_url.clone(),
            last_known_token: config.last_stored_timestamp.clone(),
            position_urls: config.scrape.position_urls.clone(),
            run_deadline: config.scrape.run_deadline,
            season_start: config.season_start,
            week_override: config.week_override,
        }
    }
}

/// Collaborators, injected so tests can swap in fakes.
pub struct PipelineComponents {
    pub detector: Option<ChangeDetector>,
    pub aggregator: RankingsAggregator,
    pub publisher: PublishPipeline,
    pub notifier: Option<Notifier>,
}

enum Gathered {
    Finished(CycleReport),
    Scraped {
        snapshot: RankingsSnapshot,
        token: Option<String>,
    },
}

pub struct Pipeline {
    settings: PipelineSettings,
    detector: Option<ChangeDetector>,
    aggregator: RankingsAggregator,
    publisher: PublishPipeline,
    notifier: Option<Notifier>,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings, components: PipelineComponents) -> Self {
        Self {
            settings,
            detector: components.detector,
            aggregator: components.aggregator,
            publisher: components.publisher,
            notifier: components.notifier,
            run_lock: Mutex::new(()),
        }
    }

    /// Pipeline publishing to the configured GitHub repository.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store_config = config.require_store()?;
        let client = build_client(config.scrape.http_timeout)?;
        let store = Arc::new(GithubStoreClient::new(client, store_config));
        Self::with_store(
            config,
            store,
            ArtifactPaths::from(store_config),
            store_config.max_backups,
        )
    }

    pub fn with_store(
        config: &Config,
        store: Arc<dyn ArtifactStore>,
        paths: ArtifactPaths,
        max_backups: usize,
    ) -> anyhow::Result<Self> {
        let client = build_client(config.scrape.http_timeout)?;
        let chain = rankings::source_chain(&config.scrape)?;

        let detector = config.monitor_url.as_ref().map(|_| {
            ChangeDetector::new(
                Arc::new(HttpFetcher::new(client.clone())),
                chain.clone(),
                config.scrape.sample_size,
            )
        });
        let notifier = config
            .notify_webhook_url
            .as_deref()
            .map(|url| Notifier::new(client.clone(), url));

        Ok(Self::new(
            PipelineSettings::from(config),
            PipelineComponents {
                detector,
                aggregator: RankingsAggregator::new(chain, config.scrape.position_pause),
                publisher: PublishPipeline::new(store, paths, max_backups),
                notifier,
            },
        ))
    }

    pub fn is_busy(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Runs one cycle. Fails with [`CrawlerError::Busy`] when another cycle
    /// is in progress, and with [`CrawlerError::Timeout`] when detection and
    /// scraping overrun the deadline; nothing is published in either case.
    pub async fn run(&self, mode: RunMode) -> CrawlerResult<CycleReport> {
        let _guard = self.run_lock.try_lock().map_err(|_| CrawlerError::Busy)?;
        info!(?mode, "Cycle starting");

        let deadline = self.settings.run_deadline;
        let gathered = tokio::time::timeout(deadline, self.gather(mode))
            .await
            .map_err(|_| CrawlerError::Timeout(deadline))??;

        let (snapshot, token) = match gathered {
            Gathered::Finished(report) => {
                info!(status = ?report.status, reason = %report.reason, "Cycle finished without scraping");
                return Ok(report);
            }
            Gathered::Scraped { snapshot, token } => (snapshot, token),
        };

        let outcome = self.publisher.publish(&snapshot, token.as_deref()).await?;
        if let Some(token) = &token {
            self.remember_token(token, snapshot.week()).await;
        }
        if outcome.written {
            self.notify(&snapshot, token.clone());
        }

        let report = CycleReport::after_publish(outcome, &snapshot, token);
        info!(
            status = ?report.status,
            total = report.total_players,
            version = report.version.as_deref().unwrap_or("-"),
            "Cycle finished"
        );
        Ok(report)
    }

    pub async fn run_scheduled(&self) -> CrawlerResult<CycleReport> {
        self.run(RunMode::Scheduled).await
    }

    pub async fn run_forced(&self) -> CrawlerResult<CycleReport> {
        self.run(RunMode::Forced).await
    }

    async fn gather(&self, mode: RunMode) -> CrawlerResult<Gathered> {
        let week = week_number(
            self.settings.season_start,
            OffsetDateTime::now_utc().date(),
            self.settings.week_override,
        );
        let mut token = None;

        let gate = match (mode, &self.settings.monitor_url, &self.detector) {
            (RunMode::Scheduled, Some(url), Some(detector)) => Some((url, detector)),
            (RunMode::Scheduled, _, _) => {
                info!("No monitor URL configured, scraping without a freshness gate");
                None
            }
            (RunMode::Forced, _, _) => None,
        };

        if let Some((monitor_url, detector)) = gate {
            let last_known = self.last_known_token().await;
            let check = detector
                .check_freshness(monitor_url, last_known.as_deref())
                .await?;
            if !check.token_changed {
                return Ok(Gathered::Finished(CycleReport::without_scrape(
                    CycleStatus::Skipped,
                    "token-unchanged",
                    Some(check.current_token),
                    None,
                )));
            }

            let published = self.publisher.current_snapshot().await.unwrap_or_else(|e| {
                warn!("Could not read published rankings for sampling: {}", e);
                None
            });
            if let Some(position) = self.sample_position() {
                let urls = self.urls_for(position);
                if !detector
                    .sample_content_changed(position, urls, published.as_ref())
                    .await
                {
                    self.remember_token(&check.current_token, week).await;
                    return Ok(Gathered::Finished(CycleReport::without_scrape(
                        CycleStatus::NoOp,
                        "content-sample-unchanged",
                        Some(check.current_token),
                        published.as_ref(),
                    )));
                }
            }
            token = Some(check.current_token);
        }

        let trigger = match mode {
            RunMode::Scheduled => ScrapeTrigger::Timestamp,
            RunMode::Forced => ScrapeTrigger::Forced,
        };
        let snapshot = self
            .aggregator
            .scrape_all(&self.settings.position_urls, week, trigger)
            .await?;
        Ok(Gathered::Scraped { snapshot, token })
    }

    fn urls_for(&self, position: Position) -> &[String] {
        self.settings
            .position_urls
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// FLEX when configured, otherwise the first position with URLs.
    fn sample_position(&self) -> Option<Position> {
        std::iter::once(Position::Flex)
            .chain(Position::ALL)
            .find(|p| !self.urls_for(*p).is_empty())
    }

    async fn last_known_token(&self) -> Option<String> {
        if let Some(token) = &self.settings.last_known_token {
            return Some(token.clone());
        }
        match self.publisher.stored_token().await {
            Ok(record) => record.map(|r| r.last_stored_timestamp),
            Err(e) => {
                warn!("Could not read stored freshness token: {}", e);
                None
            }
        }
    }

    async fn remember_token(&self, token: &str, week: u8) {
        if let Err(e) = self.publisher.store_token(token, week).await {
            warn!(token, "Could not persist freshness token: {}", e);
        }
    }

    fn notify(&self, snapshot: &RankingsSnapshot, token: Option<String>) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(UpdateNotification {
                kind: "rankings-updated".to_string(),
                week_number: snapshot.week(),
                article_timestamp: token,
                url: self.settings.monitor_url.clone(),
                total_players: snapshot.total_players(),
            });
        }
    }
}
