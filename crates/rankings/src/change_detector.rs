//! Decides whether upstream rankings are worth re-scraping.
//!
//! The primary signal is a freshness token (a timestamp) scraped from the
//! monitored article page. Because that token is known to flip without the
//! rankings moving, a cheaper secondary check compares the head of one
//! reference position against what is currently published.

use std::sync::{Arc, LazyLock};

use common::{CrawlerError, CrawlerResult, Position};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::models::RankingsSnapshot;
use crate::source::{PageFetcher, SourceChain};

/// Token locations in priority order: (css selector, attribute holding the token).
const TOKEN_LOCATIONS: &[(&str, &str)] = &[
    (".content-timestamp time[datetime]", "datetime"),
    ("time[datetime]", "datetime"),
    ("[data-timestamp]", "data-timestamp"),
    ("meta[property=\"article:modified_time\"]", "content"),
];

static TOKEN_SELECTORS: LazyLock<Vec<(Selector, &'static str)>> = LazyLock::new(|| {
    TOKEN_LOCATIONS
        .iter()
        .map(|(css, attr)| (Selector::parse(css).unwrap(), *attr))
        .collect()
});

static JSON_LD_MODIFIED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""dateModified"\s*:\s*"([^"]+)""#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessCheck {
    pub token_changed: bool,
    pub current_token: String,
}

/// First non-empty freshness token found in `html`, captured verbatim (trimmed).
pub fn extract_freshness_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    TOKEN_SELECTORS
        .iter()
        .find_map(|(selector, attr)| {
            document
                .select(selector)
                .filter_map(|el| el.value().attr(attr))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(String::from)
        })
        .or_else(|| {
            JSON_LD_MODIFIED
                .captures(html)
                .map(|caps| caps[1].trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

pub struct ChangeDetector {
    fetcher: Arc<dyn PageFetcher>,
    sources: SourceChain,
    sample_size: usize,
}

impl ChangeDetector {
    pub fn new(fetcher: Arc<dyn PageFetcher>, sources: SourceChain, sample_size: usize) -> Self {
        Self {
            fetcher,
            sources,
            sample_size: sample_size.max(1),
        }
    }

    /// Fetches the monitored page and compares its token with `last_known`.
    ///
    /// Fails with [`CrawlerError::SourceUnavailable`] when the page cannot be
    /// fetched or carries no token; callers must not scrape on that outcome.
    /// A missing `last_known` always counts as changed.
    pub async fn check_freshness(
        &self,
        monitor_url: &str,
        last_known: Option<&str>,
    ) -> CrawlerResult<FreshnessCheck> {
        let html = match self.fetcher.fetch_text(monitor_url).await {
            Ok(Some(html)) => html,
            Ok(None) => {
                return Err(CrawlerError::SourceUnavailable(format!(
                    "monitor page {} did not answer 200",
                    monitor_url
                )))
            }
            Err(e) => {
                return Err(CrawlerError::SourceUnavailable(format!(
                    "monitor page {}: {}",
                    monitor_url, e
                )))
            }
        };

        let current_token = extract_freshness_token(&html).ok_or_else(|| {
            CrawlerError::SourceUnavailable(format!("no freshness token on {}", monitor_url))
        })?;
        let token_changed = last_known.map(str::trim) != Some(current_token.as_str());

        info!(
            current = %current_token,
            last_known = last_known.unwrap_or("<none>"),
            token_changed,
            "Freshness check"
        );
        Ok(FreshnessCheck {
            token_changed,
            current_token,
        })
    }

    /// Compares the first `sample_size` (rank, player) pairs of `position`
    /// against the published snapshot. Any doubt (nothing published, nothing
    /// fetched, differing lengths) counts as changed.
    pub async fn sample_content_changed(
        &self,
        position: Position,
        urls: &[String],
        published: Option<&RankingsSnapshot>,
    ) -> bool {
        let Some(published) = published else {
            debug!("No published snapshot to sample against");
            return true;
        };
        let Some(fetched) = self.sources.fetch_position(position, urls).await else {
            warn!(position = %position, "Sample fetch came back empty, assuming changed");
            return true;
        };

        let fresh = fetched.entries.head(self.sample_size);
        let current = published.position(position).head(self.sample_size);
        if fresh.len() != current.len() {
            info!(fresh = fresh.len(), published = current.len(), "Sample length differs");
            return true;
        }

        let mismatch = fresh
            .iter()
            .zip(current)
            .position(|(a, b)| a.rank != b.rank || a.player_name != b.player_name);
        match mismatch {
            Some(idx) => {
                info!(position = %position, idx, "Sample differs from published rankings");
                true
            }
            None => {
                info!(position = %position, sampled = fresh.len(), "Sample matches published rankings");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_content_timestamp_over_other_locations() {
        let html = r#"
            <meta property="article:modified_time" content="2025-09-01T00:00:00Z">
            <time datetime="2025-09-02T00:00:00Z">Sept 2</time>
            <div class="content-timestamp"><time datetime=" 2025-09-08T00:00:00Z ">Sept 8</time></div>
        "#;
        assert_eq!(
            extract_freshness_token(html).as_deref(),
            Some("2025-09-08T00:00:00Z")
        );
    }

    #[test]
    fn falls_back_through_attributes_and_json_ld() {
        let data_attr = r#"<span data-timestamp="1757289600">updated</span>"#;
        assert_eq!(extract_freshness_token(data_attr).as_deref(), Some("1757289600"));

        let meta = r#"<meta property="article:modified_time" content="2025-09-09T12:00:00-04:00">"#;
        assert_eq!(
            extract_freshness_token(meta).as_deref(),
            Some("2025-09-09T12:00:00-04:00")
        );

        let json_ld = r#"<script type="application/ld+json">{"dateModified": "2025-09-10T08:00:00Z"}</script>"#;
        assert_eq!(
            extract_freshness_token(json_ld).as_deref(),
            Some("2025-09-10T08:00:00Z")
        );
    }

    #[test]
    fn empty_attributes_are_skipped() {
        let html = r#"<time datetime="">soon</time><span data-timestamp="abc"></span>"#;
        assert_eq!(extract_freshness_token(html).as_deref(), Some("abc"));
        assert_eq!(extract_freshness_token("<p>nothing here</p>"), None);
    }
}
