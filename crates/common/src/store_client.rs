use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;

/// File content together with the version token it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub path: String,
    pub version: String,
}

/// Key-value store with per-path version tokens.
///
/// `write` succeeds only when `expected_version` matches the current version
/// (`None` means the path must not exist yet); otherwise it fails with
/// [`StoreError::Conflict`].
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError>;

    async fn write(
        &self,
        path: &str,
        content: &str,
        expected_version: Option<&str>,
        message: &str,
    ) -> Result<String, StoreError>;

    async fn list(&self, dir: &str) -> Result<Vec<StoreEntry>, StoreError>;

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct ContentsListing {
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

/// [`ArtifactStore`] backed by the GitHub repository contents API, where the
/// blob SHA of each file is its version token.
#[derive(Clone)]
pub struct GithubStoreClient {
    client: Client,
    api_url: String,
    token: String,
    repo: String,
    branch: Option<String>,
}

impl GithubStoreClient {
    pub fn new(client: Client, config: &StoreConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method.clone(), self.contents_url(path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "rankings-publisher");
        if method == reqwest::Method::GET {
            if let Some(branch) = &self.branch {
                builder = builder.query(&[("ref", branch)]);
            }
        }
        builder
    }

    async fn api_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::Api { status, message }
    }
}

fn decode_content(file: &ContentsFile) -> Result<String, StoreError> {
    if !file.encoding.is_empty() && file.encoding != "base64" {
        return Err(StoreError::Decode(format!(
            "unsupported encoding {}",
            file.encoding
        )));
    }
    let compact: String = file.content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl ArtifactStore for GithubStoreClient {
    async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
        debug!(path, "Reading from remote store");
        let response = self.request(reqwest::Method::GET, path).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let file: ContentsFile = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                let content = decode_content(&file)?;
                Ok(Some(StoredObject {
                    content,
                    version: file.sha,
                }))
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        expected_version: Option<&str>,
        message: &str,
    ) -> Result<String, StoreError> {
        info!(
            path,
            bytes = content.len(),
            expected = expected_version.unwrap_or("<new>"),
            "Writing to remote store"
        );
        let body = WriteRequest {
            message,
            content: STANDARD.encode(content),
            sha: expected_version,
            branch: self.branch.as_deref(),
        };

        let response = self
            .request(reqwest::Method::PUT, path)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(StoreError::Conflict(path.to_string()))
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(path.to_string())),
            status if status.is_success() => {
                let written: WriteResponse = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                info!(path, version = %written.content.sha, "Remote store write accepted");
                Ok(written.content.sha)
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let response = self.request(reqwest::Method::GET, dir).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let listing: Vec<ContentsListing> = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(listing
                    .into_iter()
                    .filter(|item| item.kind == "file")
                    .map(|item| StoreEntry {
                        path: item.path,
                        version: item.sha,
                    })
                    .collect())
            }
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), StoreError> {
        let body = DeleteRequest {
            message,
            sha: version,
            branch: self.branch.as_deref(),
        };
        let response = self
            .request(reqwest::Method::DELETE, path)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(StoreError::Conflict(path.to_string()))
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(path.to_string())),
            status if status.is_success() => Ok(()),
            _ => Err(Self::api_error(response).await),
        }
    }
}
