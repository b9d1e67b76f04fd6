use std::time::Duration;

use reqwest::Client;

use crate::error::CrawlerResult;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Shared HTTP client: browser-like user agent and a hard per-request timeout.
pub fn build_client(timeout: Duration) -> CrawlerResult<Client> {
    let client = Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()?;
    Ok(client)
}
