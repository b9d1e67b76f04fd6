use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

/// Payload posted to the notification webhook after a successful publish.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub week_number: u8,
    pub article_timestamp: Option<String>,
    pub url: Option<String>,
    pub total_players: usize,
}

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(client: Client, webhook_url: &str) -> Self {
        Self {
            client,
            webhook_url: webhook_url.to_string(),
        }
    }

    /// Fire-and-forget delivery; failures are only logged.
    pub fn notify(&self, payload: UpdateNotification) {
        let client = self.client.clone();
        let url = self.webhook_url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(week = payload.week_number, "Update notification delivered");
                }
                Ok(resp) => warn!(status = %resp.status(), "Notification webhook rejected payload"),
                Err(e) => warn!("Notification webhook failed: {}", e),
            }
        });
    }
}
