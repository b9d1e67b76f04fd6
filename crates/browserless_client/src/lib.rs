pub mod error;

pub use error::{BrowserlessError, Result};

use serde::Serialize;
use tracing::debug;

/// How long to wait, and for what, before the rendered markup is captured.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub wait_for_selector: Option<String>,
    pub selector_timeout_ms: u64,
    pub settle_ms: u64,
    pub navigation_timeout_ms: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wait_for_selector: Some("table".to_string()),
            selector_timeout_ms: 15_000,
            settle_ms: 3_000,
            navigation_timeout_ms: 20_000,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_selector: Option<WaitForSelector<'a>>,
    wait_for_timeout: u64,
    goto_options: GotoOptions,
}

#[derive(Debug, Serialize)]
struct WaitForSelector<'a> {
    selector: &'a str,
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct GotoOptions {
    timeout: u64,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    /// The supplied client's own timeout should exceed the render budget
    /// (navigation + selector wait + settle).
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<&str>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully-rendered HTML content for a URL via the /content endpoint.
    pub async fn content(&self, url: &str, options: &RenderOptions) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = ContentRequest {
            url,
            wait_for_selector: options.wait_for_selector.as_deref().map(|selector| {
                WaitForSelector {
                    selector,
                    timeout: options.selector_timeout_ms,
                }
            }),
            wait_for_timeout: options.settle_ms,
            goto_options: GotoOptions {
                timeout: options.navigation_timeout_ms,
            },
        };
        debug!(url, "Requesting rendered content");

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            // Browserless answers 408 when the selector never appears.
            if status.as_u16() == 408 {
                return Err(BrowserlessError::Timeout(message));
            }
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_browserless_field_names() {
        let options = RenderOptions::default();
        let body = ContentRequest {
            url: "https://charts.example/abc",
            wait_for_selector: Some(WaitForSelector {
                selector: "table",
                timeout: options.selector_timeout_ms,
            }),
            wait_for_timeout: options.settle_ms,
            goto_options: GotoOptions {
                timeout: options.navigation_timeout_ms,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["waitForSelector"]["selector"], "table");
        assert_eq!(json["waitForSelector"]["timeout"], 15_000);
        assert_eq!(json["waitForTimeout"], 3_000);
        assert_eq!(json["gotoOptions"]["timeout"], 20_000);
    }
}
