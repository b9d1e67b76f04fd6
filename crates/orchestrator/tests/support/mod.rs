#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{CrawlerResult, MemoryStore, Position, RetryPolicy};
use orchestrator::{Pipeline, PipelineComponents, PipelineSettings};
use rankings::{
    ArtifactPaths, ChangeDetector, PageFetcher, PublishPipeline, RankingsAggregator, RawRow,
    RowSource, SourceChain,
};
use time::macros::date;
use tokio::sync::Notify;

pub const MONITOR_URL: &str = "https://news.example/fantasy/rankings";
pub const QB_URL: &str = "https://charts.example/qb";

/// Monitor page whose freshness token can be changed between cycles.
#[derive(Default)]
pub struct MonitorPage {
    token: Mutex<Option<String>>,
}

impl MonitorPage {
    pub fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = Some(token.to_string());
    }
}

#[async_trait]
impl PageFetcher for MonitorPage {
    async fn fetch_text(&self, url: &str) -> CrawlerResult<Option<String>> {
        if url != MONITOR_URL {
            return Ok(None);
        }
        Ok(self.token.lock().unwrap().as_ref().map(|token| {
            format!(r#"<div class="content-timestamp"><time datetime="{token}">Updated</time></div>"#)
        }))
    }
}

/// Row source with swappable rows, an optional delay, and an optional gate
/// that holds the fetch until released.
#[derive(Default)]
pub struct ChartSource {
    rows: Mutex<Vec<Vec<String>>>,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl ChartSource {
    pub fn set_players(&self, players: &[&str]) {
        *self.rows.lock().unwrap() = players
            .iter()
            .enumerate()
            .map(|(idx, name)| vec![(idx + 1).to_string(), name.to_string(), "vs MIA".to_string()])
            .collect();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Returns (started, release).
    pub fn gate(&self) -> (Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some((started.clone(), release.clone()));
        (started, release)
    }
}

#[async_trait]
impl RowSource for ChartSource {
    fn label(&self) -> &'static str {
        "CSV"
    }

    async fn fetch_rows(&self, _url: &str) -> Vec<RawRow> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some((started, release)) = gate {
            started.notify_one();
            release.notified().await;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rows = self.rows.lock().unwrap().clone();
        rows.into_iter().map(RawRow::positional).collect()
    }
}

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<MemoryStore>,
    pub monitor: Arc<MonitorPage>,
    pub source: Arc<ChartSource>,
}

pub fn harness(monitored: bool, run_deadline: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let monitor = Arc::new(MonitorPage::default());
    let source = Arc::new(ChartSource::default());
    let chain = SourceChain::new(vec![source.clone()]);

    let settings = PipelineSettings {
        monitor_url: monitored.then(|| MONITOR_URL.to_string()),
        last_known_token: None,
        position_urls: BTreeMap::from([(Position::Qb, vec![QB_URL.to_string()])]),
        run_deadline,
        season_start: date!(2025 - 09 - 05),
        week_override: Some(2),
    };
    let components = PipelineComponents {
        detector: monitored.then(|| ChangeDetector::new(monitor.clone(), chain.clone(), 10)),
        aggregator: RankingsAggregator::new(chain, Duration::ZERO),
        publisher: PublishPipeline::new(store.clone(), ArtifactPaths::default(), 30).with_retry_policy(
            RetryPolicy {
                max_retries: 2,
                delay: Duration::from_millis(1),
            },
        ),
        notifier: None,
    };

    Harness {
        pipeline: Arc::new(Pipeline::new(settings, components)),
        store,
        monitor,
        source,
    }
}

impl Harness {
    pub fn rankings_writes(&self) -> usize {
        self.store
            .writes()
            .iter()
            .filter(|w| w.path == "rankings.json" && w.accepted)
            .count()
    }
}
