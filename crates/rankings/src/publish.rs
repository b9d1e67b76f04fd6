use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{
    overwrite_with_retry, store_with_retry, ArtifactStore, BeforeOverwrite, CrawlerError,
    CrawlerResult, RetryPolicy, StoreConfig, StoredObject,
};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::models::{format_timestamp, RankingsSnapshot};

const BACKUP_PREFIX: &str = "rankings-";

/// Where the published artifacts live in the store.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub rankings: String,
    pub timestamp: String,
    pub backup_dir: String,
}

impl From<&StoreConfig> for ArtifactPaths {
    fn from(config: &StoreConfig) -> Self {
        Self {
            rankings: config.rankings_path.clone(),
            timestamp: config.timestamp_path.clone(),
            backup_dir: config.backup_dir.clone(),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            rankings: "rankings.json".to_string(),
            timestamp: "timestamp.json".to_string(),
            backup_dir: "backups".to_string(),
        }
    }
}

/// Last freshness token the pipeline acted on, kept next to the rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub last_stored_timestamp: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub week: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishReason {
    /// Essential fields match what is already published.
    NoOp,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub written: bool,
    pub reason: PublishReason,
    pub version: Option<String>,
    pub summary: String,
    pub backup_path: Option<String>,
    pub content_hash: String,
}

pub struct PublishPipeline {
    store: Arc<dyn ArtifactStore>,
    paths: ArtifactPaths,
    policy: RetryPolicy,
    max_backups: usize,
}

impl PublishPipeline {
    pub fn new(store: Arc<dyn ArtifactStore>, paths: ArtifactPaths, max_backups: usize) -> Self {
        Self {
            store,
            paths,
            policy: RetryPolicy::default(),
            max_backups,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// The currently published snapshot. Unparseable content is logged and
    /// treated as absent so a fresh scrape can replace it.
    pub async fn current_snapshot(&self) -> CrawlerResult<Option<RankingsSnapshot>> {
        let Some(object) = self.store.read(&self.paths.rankings).await? else {
            return Ok(None);
        };
        Ok(parse_published(&self.paths.rankings, &object.content))
    }

    /// Publishes `snapshot` unless its essential fields match the published one.
    ///
    /// When `freshness_token` is given it becomes the artifact's `lastUpdated`.
    /// The write uses optimistic concurrency; whatever each attempt is about to
    /// overwrite is backed up first (best-effort), so a concurrent writer's
    /// version is kept too.
    pub async fn publish(
        &self,
        snapshot: &RankingsSnapshot,
        freshness_token: Option<&str>,
    ) -> CrawlerResult<PublishOutcome> {
        let content_hash = snapshot.essential_hash();
        let summary = snapshot.summary();
        let current = self.store.read(&self.paths.rankings).await?;

        let published_hash = current
            .as_ref()
            .and_then(|object| parse_published(&self.paths.rankings, &object.content))
            .map(|published| published.essential_hash());
        if published_hash.as_deref() == Some(content_hash.as_str()) {
            info!(hash = %content_hash, "Rankings unchanged, skipping write");
            return Ok(PublishOutcome {
                written: false,
                reason: PublishReason::NoOp,
                version: None,
                summary,
                backup_path: None,
                content_hash,
            });
        }

        let stamped = match freshness_token {
            Some(token) => snapshot.clone().with_last_updated(token),
            None => snapshot.clone(),
        };
        let body = stamped
            .to_json_pretty()
            .map_err(|e| CrawlerError::Parse(format!("could not serialize rankings: {}", e)))?;

        let backups = BackupBeforeWrite {
            pipeline: self,
            last: Mutex::new(None),
        };
        let message = format!("Update rankings for week {} ({})", stamped.week(), summary);
        let version = overwrite_with_retry(
            self.store.as_ref(),
            &self.paths.rankings,
            &body,
            &message,
            self.policy,
            Some(&backups),
        )
        .await?;
        let backup_path = backups.last_path();

        info!(
            version = %version,
            hash = %content_hash,
            total = stamped.total_players(),
            "Rankings published"
        );
        Ok(PublishOutcome {
            written: true,
            reason: PublishReason::Updated,
            version: Some(version),
            summary,
            backup_path,
            content_hash,
        })
    }

    /// Copies `current` into a timestamped backup, then prunes old backups.
    /// Failures are logged and never block the publish.
    async fn backup(&self, current: &StoredObject) -> Option<String> {
        let stamp = OffsetDateTime::now_utc()
            .format(format_description!(
                "[year][month][day]T[hour][minute][second]Z"
            ))
            .ok()?;
        let version: String = current
            .version
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect();
        let path = format!(
            "{}/{}{}-{}.json",
            self.paths.backup_dir, BACKUP_PREFIX, stamp, version
        );

        match self
            .store
            .write(&path, &current.content, None, &format!("Back up rankings to {}", path))
            .await
        {
            Ok(_) => {
                info!(path = %path, replaced = %current.version, "Backed up published rankings");
                self.prune_backups().await;
                Some(path)
            }
            Err(e) => {
                warn!(path = %path, "Backup failed, publishing anyway: {}", e);
                None
            }
        }
    }

    async fn prune_backups(&self) {
        if self.max_backups == 0 {
            return;
        }
        let mut backups = match self.store.list(&self.paths.backup_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.paths.backup_dir, "Could not list backups: {}", e);
                return;
            }
        };
        backups.retain(|entry| {
            let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
            name.starts_with(BACKUP_PREFIX) && name.ends_with(".json")
        });
        if backups.len() <= self.max_backups {
            return;
        }

        backups.sort_by(|a, b| a.path.cmp(&b.path));
        let excess = backups.len() - self.max_backups;
        for entry in backups.into_iter().take(excess) {
            match self
                .store
                .delete(&entry.path, &entry.version, "Prune old rankings backup")
                .await
            {
                Ok(()) => info!(path = %entry.path, "Pruned old backup"),
                Err(e) => warn!(path = %entry.path, "Could not prune backup: {}", e),
            }
        }
    }

    /// The persisted freshness token, if one was stored and is readable.
    pub async fn stored_token(&self) -> CrawlerResult<Option<TokenRecord>> {
        let Some(object) = self.store.read(&self.paths.timestamp).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<TokenRecord>(&object.content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %self.paths.timestamp, "Ignoring unreadable token record: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn store_token(&self, token: &str, week: u8) -> CrawlerResult<String> {
        let record = TokenRecord {
            last_stored_timestamp: token.to_string(),
            last_updated: format_timestamp(OffsetDateTime::now_utc()),
            week: Some(week),
        };
        let body = serde_json::to_string_pretty(&record)
            .map_err(|e| CrawlerError::Parse(format!("could not serialize token record: {}", e)))?;
        let version = store_with_retry(
            self.store.as_ref(),
            &self.paths.timestamp,
            &body,
            &format!("Record freshness token {}", token),
            self.policy,
        )
        .await?;
        info!(token, version = %version, "Stored freshness token");
        Ok(version)
    }
}

/// Backs up each distinct version a rankings write is about to replace.
struct BackupBeforeWrite<'a> {
    pipeline: &'a PublishPipeline,
    /// Version most recently backed up, and where it went.
    last: Mutex<Option<(String, Option<String>)>>,
}

impl<'a> BackupBeforeWrite<'a> {
    fn last_path(&self) -> Option<String> {
        self.lock().as_ref().and_then(|(_, path)| path.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(String, Option<String>)>> {
        self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<'a> BeforeOverwrite for BackupBeforeWrite<'a> {
    async fn before_overwrite(&self, _path: &str, current: &StoredObject) {
        let already = matches!(&*self.lock(), Some((version, _)) if *version == current.version);
        if already {
            return;
        }
        let path = self.pipeline.backup(current).await;
        *self.lock() = Some((current.version.clone(), path));
    }
}

fn parse_published(path: &str, content: &str) -> Option<RankingsSnapshot> {
    match RankingsSnapshot::from_json(content) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(path, "Published rankings are unreadable: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PositionRankingSet, RankingEntry};
    use common::{MemoryStore, Position};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn snapshot(players: &[(&str, &str)]) -> RankingsSnapshot {
        let entries = players
            .iter()
            .enumerate()
            .map(|(idx, (name, opp))| RankingEntry {
                rank: idx as u32 + 1,
                player_name: name.to_string(),
                opponent: opp.to_string(),
                position_rank_label: None,
                fantasy_points: None,
            })
            .collect();
        let positions = BTreeMap::from([(Position::Qb, PositionRankingSet::from_entries(entries))]);
        RankingsSnapshot::new(positions, 2, OffsetDateTime::now_utc(), "Forced-CSV")
    }

    fn pipeline(store: Arc<MemoryStore>, max_backups: usize) -> PublishPipeline {
        PublishPipeline::new(store, ArtifactPaths::default(), max_backups).with_retry_policy(
            RetryPolicy {
                max_retries: 2,
                delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn first_publish_writes_without_backup() {
        let store = Arc::new(MemoryStore::new());
        let outcome = pipeline(store.clone(), 30)
            .publish(&snapshot(&[("Josh Allen", "vs ARI")]), Some("2025-09-08T00:00:00Z"))
            .await
            .unwrap();

        assert!(outcome.written);
        assert_eq!(outcome.reason, PublishReason::Updated);
        assert!(outcome.backup_path.is_none());

        let published = RankingsSnapshot::from_json(&store.get("rankings.json").unwrap().content).unwrap();
        assert_eq!(published.last_updated(), "2025-09-08T00:00:00Z");
        assert_eq!(published.position(Position::Qb).len(), 1);
    }

    #[tokio::test]
    async fn changed_rankings_back_up_previous_artifact() {
        let store = Arc::new(MemoryStore::new());
        let old = snapshot(&[("Josh Allen", "vs ARI")]).to_json_pretty().unwrap();
        store.seed("rankings.json", &old);

        let outcome = pipeline(store.clone(), 30)
            .publish(&snapshot(&[("Lamar Jackson", "@ KC")]), None)
            .await
            .unwrap();

        let backup = outcome.backup_path.unwrap();
        assert!(backup.starts_with("backups/rankings-"));
        assert_eq!(store.get(&backup).unwrap().content, old);
        assert_eq!(outcome.version.as_deref(), Some("v3"));
    }

    #[tokio::test]
    async fn prunes_backups_beyond_the_limit() {
        let store = Arc::new(MemoryStore::new());
        store.seed("backups/rankings-20250901T000000Z.json", "{}");
        store.seed("backups/rankings-20250902T000000Z.json", "{}");
        store.seed("backups/notes.txt", "keep me");
        store.seed("rankings.json", &snapshot(&[("Josh Allen", "vs ARI")]).to_json_pretty().unwrap());

        pipeline(store.clone(), 2)
            .publish(&snapshot(&[("Joe Burrow", "vs NE")]), None)
            .await
            .unwrap();

        let backups: Vec<String> = store
            .paths()
            .into_iter()
            .filter(|p| p.starts_with("backups/rankings-"))
            .collect();
        assert_eq!(backups.len(), 2);
        assert!(!backups.contains(&"backups/rankings-20250901T000000Z.json".to_string()));
        assert!(store.get("backups/notes.txt").is_some());
    }

    #[tokio::test]
    async fn unreadable_published_artifact_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.seed("rankings.json", "<html>not json</html>");

        let publisher = pipeline(store.clone(), 0);
        assert!(publisher.current_snapshot().await.unwrap().is_none());
        let outcome = publisher
            .publish(&snapshot(&[("Josh Allen", "vs ARI")]), None)
            .await
            .unwrap();
        assert!(outcome.written);
    }

    #[tokio::test]
    async fn token_record_round_trips_through_the_store() {
        let store = Arc::new(MemoryStore::new());
        let publisher = pipeline(store.clone(), 30);
        assert!(publisher.stored_token().await.unwrap().is_none());

        publisher.store_token("2025-09-08T00:00:00Z", 2).await.unwrap();
        publisher.store_token("2025-09-15T00:00:00Z", 3).await.unwrap();

        let record = publisher.stored_token().await.unwrap().unwrap();
        assert_eq!(record.last_stored_timestamp, "2025-09-15T00:00:00Z");
        assert_eq!(record.week, Some(3));
    }
}
