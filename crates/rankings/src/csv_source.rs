use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info};

use crate::extractor::{HeaderMap, RawRow};
use crate::source::{log_source_failure, PageFetcher, RowSource};

const CSV_HOST: &str = "https://datawrapper.dwcdn.net";
const VERSION_SEGMENTS: [u8; 3] = [1, 2, 3];

static DWCDN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"datawrapper\.dwcdn\.net/([A-Za-z0-9]+)").unwrap());
static SHARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"datawrapper\.de/_/([A-Za-z0-9]+)").unwrap());
static PATH_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{5,}$").unwrap());

/// Chart identifier embedded in a share link, if any.
pub fn chart_id(url: &str) -> Option<String> {
    if let Some(caps) = DWCDN_ID.captures(url).or_else(|| SHARE_ID.captures(url)) {
        return Some(caps[1].to_string());
    }
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .find(|segment| PATH_ID.is_match(segment))
        .map(String::from)
}

/// Direct CSV endpoints to try for a share link, in order.
pub fn csv_candidates(url: &str) -> Vec<String> {
    if url.split(['?', '#']).next().is_some_and(|path| path.ends_with(".csv")) {
        return vec![url.to_string()];
    }
    match chart_id(url) {
        Some(id) => std::iter::once(format!("{CSV_HOST}/{id}/dataset.csv"))
            .chain(
                VERSION_SEGMENTS
                    .iter()
                    .map(|n| format!("{CSV_HOST}/{id}/{n}/dataset.csv")),
            )
            .collect(),
        None => vec![url.to_string()],
    }
}

/// Parses a CSV export. The first record is the header; it drives the column
/// mapping when it names a rank and a player column, and is never returned as
/// a row. Quoted fields may contain commas and doubled quotes; rows may be ragged.
pub fn parse_csv_rows(text: &str) -> Vec<RawRow> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let header = reader
        .headers()
        .ok()
        .and_then(|headers| HeaderMap::from_headers(&headers.iter().collect::<Vec<_>>()))
        .map(Arc::new);

    reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping unreadable CSV record: {}", e);
                None
            }
        })
        .filter(|record| record.iter().any(|field| !field.is_empty()))
        .map(|record| {
            let cells = record.iter().map(String::from).collect::<Vec<_>>();
            match &header {
                Some(map) => RawRow::mapped(cells, map.clone()),
                None => RawRow::positional(cells),
            }
        })
        .collect()
}

/// Resolves share links to a CSV download and parses it.
pub struct CsvSource {
    fetcher: Arc<dyn PageFetcher>,
}

impl CsvSource {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl RowSource for CsvSource {
    fn label(&self) -> &'static str {
        "CSV"
    }

    async fn fetch_rows(&self, url: &str) -> Vec<RawRow> {
        let candidates = csv_candidates(url);
        for endpoint in &candidates {
            let rows = match self.fetcher.fetch_text(endpoint).await {
                Ok(Some(body)) => parse_csv_rows(&body),
                Ok(None) => continue,
                Err(e) => {
                    log_source_failure(self.label(), endpoint, e);
                    continue;
                }
            };
            if !rows.is_empty() {
                info!(url, endpoint = %endpoint, rows = rows.len(), "CSV endpoint resolved");
                return rows;
            }
        }
        debug!(url, tried = candidates.len(), "No CSV endpoint answered");
        Vec::new()
    }
}
