use std::sync::Arc;

use async_trait::async_trait;
use common::{CrawlerResult, Position};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::extractor::{extract, RawRow};
use crate::models::{PositionRankingSet, RankingEntry};

/// Plain HTTP GET seam, so adapters and the change detector can run against fakes.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `Ok(None)` for a non-success status; `Err` only for transport failures.
    async fn fetch_text(&self, url: &str) -> CrawlerResult<Option<String>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> CrawlerResult<Option<String>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!(url, %status, "Non-success response");
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

/// Something that turns one source URL into raw table rows.
///
/// Implementations swallow their own failures: a broken URL yields an empty
/// vector so the caller can move on to the next candidate.
#[async_trait]
pub trait RowSource: Send + Sync {
    fn label(&self) -> &'static str;

    async fn fetch_rows(&self, url: &str) -> Vec<RawRow>;
}

/// Where a position's rankings came from.
#[derive(Debug, Clone)]
pub struct PositionFetch {
    pub url: String,
    pub source: &'static str,
    pub entries: PositionRankingSet,
}

/// Ordered row sources tried against each candidate URL.
#[derive(Clone)]
pub struct SourceChain {
    sources: Vec<Arc<dyn RowSource>>,
}

impl SourceChain {
    pub fn new(sources: Vec<Arc<dyn RowSource>>) -> Self {
        Self { sources }
    }

    /// `CSV`, `CSV+Rendered-Table`, ...
    pub fn method_label(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Tries every (URL, source) pair in priority order and returns the first
    /// that produces at least one usable entry. `None` when all candidates
    /// come up empty, including when `urls` is empty.
    pub async fn fetch_position(&self, position: Position, urls: &[String]) -> Option<PositionFetch> {
        for url in urls {
            for source in &self.sources {
                let rows = source.fetch_rows(url).await;
                let entries = extract_all(&rows, position);
                info!(
                    position = %position,
                    url = %url,
                    source = source.label(),
                    rows = rows.len(),
                    entries = entries.len(),
                    "Candidate attempt finished"
                );
                if !entries.is_empty() {
                    return Some(PositionFetch {
                        url: url.clone(),
                        source: source.label(),
                        entries: PositionRankingSet::from_entries(entries),
                    });
                }
            }
        }
        None
    }
}

/// Maps every row through the extractor, silently dropping unusable rows.
pub fn extract_all(rows: &[RawRow], position: Position) -> Vec<RankingEntry> {
    let entries: Vec<RankingEntry> = rows.iter().filter_map(|row| extract(row, position)).collect();
    let dropped = rows.len() - entries.len();
    if dropped > 0 {
        debug!(position = %position, dropped, "Dropped rows without a usable rank or name");
    }
    entries
}

pub(crate) fn log_source_failure(source: &str, url: &str, err: impl std::fmt::Display) {
    warn!(source, url, "Source attempt failed: {}", err);
}
