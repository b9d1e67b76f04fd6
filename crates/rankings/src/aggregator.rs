use std::collections::BTreeMap;
use std::time::Duration;

use common::{CrawlerError, CrawlerResult, Position};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::models::{PositionRankingSet, RankingsSnapshot};
use crate::source::SourceChain;

/// Why a scrape was started; recorded in the snapshot's method label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeTrigger {
    Timestamp,
    Forced,
}

impl ScrapeTrigger {
    pub fn prefix(self) -> &'static str {
        match self {
            ScrapeTrigger::Timestamp => "Timestamp-Triggered",
            ScrapeTrigger::Forced => "Forced",
        }
    }
}

pub struct RankingsAggregator {
    sources: SourceChain,
    pause: Duration,
}

impl RankingsAggregator {
    pub fn new(sources: SourceChain, pause: Duration) -> Self {
        Self { sources, pause }
    }

    pub fn method_label(&self, trigger: ScrapeTrigger) -> String {
        format!("{}-{}", trigger.prefix(), self.sources.method_label())
    }

    /// Scrapes every tracked position in order, pausing between positions
    /// that hit the network. Positions without URLs, or whose candidates all
    /// come up empty, stay empty. Fails with [`CrawlerError::NoDataScraped`]
    /// only when every position is empty.
    pub async fn scrape_all(
        &self,
        position_urls: &BTreeMap<Position, Vec<String>>,
        week: u8,
        trigger: ScrapeTrigger,
    ) -> CrawlerResult<RankingsSnapshot> {
        let mut positions = BTreeMap::new();
        let mut fetched_any = false;

        for position in Position::ALL {
            let urls = position_urls.get(&position).map(Vec::as_slice).unwrap_or(&[]);
            if urls.is_empty() {
                info!(position = %position, "No candidate URLs configured");
                positions.insert(position, PositionRankingSet::default());
                continue;
            }
            if fetched_any && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            fetched_any = true;

            let set = match self.sources.fetch_position(position, urls).await {
                Some(fetch) => {
                    info!(
                        position = %position,
                        url = %fetch.url,
                        source = fetch.source,
                        entries = fetch.entries.len(),
                        "Position scraped"
                    );
                    fetch.entries
                }
                None => {
                    warn!(position = %position, candidates = urls.len(), "All candidate URLs came up empty");
                    PositionRankingSet::default()
                }
            };
            positions.insert(position, set);
        }

        let snapshot = RankingsSnapshot::new(
            positions,
            week,
            OffsetDateTime::now_utc(),
            self.method_label(trigger),
        );
        if snapshot.total_players() == 0 {
            return Err(CrawlerError::NoDataScraped);
        }

        info!(total = snapshot.total_players(), summary = %snapshot.summary(), "Scrape complete");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nothing_configured_means_no_data() {
        let aggregator = RankingsAggregator::new(SourceChain::new(Vec::new()), Duration::ZERO);
        let result = aggregator
            .scrape_all(&BTreeMap::new(), 1, ScrapeTrigger::Forced)
            .await;
        assert!(matches!(result, Err(CrawlerError::NoDataScraped)));
    }
}
