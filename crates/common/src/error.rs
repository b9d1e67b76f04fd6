use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("HTML parsing failed: {0}")]
    HtmlParse(String),

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("No data scraped from any position")]
    NoDataScraped,

    #[error("Write conflict on {path} after {attempts} attempts")]
    WriteConflict { path: String, attempts: usize },

    #[error("Scrape run exceeded its deadline of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Another run is already in progress")]
    Busy,
}

pub type CrawlerResult<T> = Result<T, CrawlerError>;

/// Failures reported by the remote artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict on {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("store network error: {0}")]
    Network(String),

    #[error("could not decode store payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

impl CrawlerError {
    /// Short machine-readable label for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlerError::SourceUnavailable(_) => "source-unavailable",
            CrawlerError::NoDataScraped => "no-data-scraped",
            CrawlerError::WriteConflict { .. } => "write-conflict",
            CrawlerError::Timeout(_) => "timeout",
            CrawlerError::Busy => "busy",
            CrawlerError::Store(_) => "store",
            CrawlerError::Config(_) => "config",
            _ => "internal",
        }
    }
}
