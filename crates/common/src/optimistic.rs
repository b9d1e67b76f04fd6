use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{CrawlerError, CrawlerResult, StoreError};
use crate::store_client::{ArtifactStore, StoredObject};

/// Bounds for optimistic-concurrency writes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// Runs against the object an attempt is about to overwrite, after it has
/// been re-read and before the write is sent.
#[async_trait]
pub trait BeforeOverwrite: Send + Sync {
    async fn before_overwrite(&self, path: &str, current: &StoredObject);
}

/// Writes `content` to `path` with optimistic concurrency.
///
/// The path is re-read immediately before every attempt and its version token
/// is the one sent with the write; a token is never reused across attempts.
/// On a conflict the loop waits `policy.delay` and tries again, up to
/// `policy.max_retries` retries, then fails with [`CrawlerError::WriteConflict`].
/// Any other store error aborts immediately.
pub async fn store_with_retry(
    store: &dyn ArtifactStore,
    path: &str,
    content: &str,
    message: &str,
    policy: RetryPolicy,
) -> CrawlerResult<String> {
    overwrite_with_retry(store, path, content, message, policy, None).await
}

/// [`store_with_retry`] that hands each re-read object to `hook` before the
/// attempt that would replace it.
pub async fn overwrite_with_retry(
    store: &dyn ArtifactStore,
    path: &str,
    content: &str,
    message: &str,
    policy: RetryPolicy,
    hook: Option<&dyn BeforeOverwrite>,
) -> CrawlerResult<String> {
    let attempts = policy.max_retries + 1;

    for attempt in 1..=attempts {
        let current = store.read(path).await?;
        let token = current.as_ref().map(|object| object.version.clone());
        if let (Some(hook), Some(object)) = (hook, current.as_ref()) {
            hook.before_overwrite(path, object).await;
        }

        match store.write(path, content, token.as_deref(), message).await {
            Ok(version) => {
                if attempt > 1 {
                    info!(path, attempt, "Write succeeded after conflict retry");
                }
                return Ok(version);
            }
            Err(StoreError::Conflict(_)) => {
                warn!(
                    path,
                    attempt,
                    attempts,
                    stale = token.as_deref().unwrap_or("<new>"),
                    "Version conflict, re-reading token"
                );
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(CrawlerError::WriteConflict {
        path: path.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store_client::StoreEntry;
    use std::sync::Mutex;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(1),
        }
    }

    /// Lets another writer land `rival_writes` times just before our write.
    struct Contended {
        inner: MemoryStore,
        rival_writes: Mutex<usize>,
    }

    #[async_trait]
    impl ArtifactStore for Contended {
        async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
            self.inner.read(path).await
        }

        async fn write(
            &self,
            path: &str,
            content: &str,
            expected_version: Option<&str>,
            message: &str,
        ) -> Result<String, StoreError> {
            {
                let mut remaining = self.rival_writes.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    self.inner.seed(path, &format!("rival {}", remaining));
                }
            }
            self.inner.write(path, content, expected_version, message).await
        }

        async fn list(&self, dir: &str) -> Result<Vec<StoreEntry>, StoreError> {
            self.inner.list(dir).await
        }

        async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), StoreError> {
            self.inner.delete(path, version, message).await
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<String>>);

    #[async_trait]
    impl BeforeOverwrite for Seen {
        async fn before_overwrite(&self, _path: &str, current: &StoredObject) {
            self.0.lock().unwrap().push(current.content.clone());
        }
    }

    #[tokio::test]
    async fn uses_a_fresh_token_for_every_attempt() {
        let store = Contended {
            inner: MemoryStore::new(),
            rival_writes: Mutex::new(2),
        };
        let first = store.inner.seed("rankings.json", "ours");

        let version = store_with_retry(&store, "rankings.json", "new", "update", quick())
            .await
            .unwrap();

        let expected: Vec<_> = store
            .inner
            .writes()
            .into_iter()
            .map(|w| (w.expected_version, w.accepted))
            .collect();
        assert_eq!(
            expected,
            vec![
                (Some(first), false),
                (Some("v2".to_string()), false),
                (Some("v3".to_string()), true),
            ]
        );
        assert_eq!(store.inner.get("rankings.json").unwrap().version, version);
    }

    #[tokio::test]
    async fn hook_sees_whatever_each_attempt_overwrites() {
        let store = Contended {
            inner: MemoryStore::new(),
            rival_writes: Mutex::new(1),
        };
        store.inner.seed("rankings.json", "ours");
        let seen = Seen::default();

        overwrite_with_retry(&store, "rankings.json", "new", "update", quick(), Some(&seen))
            .await
            .unwrap();

        assert_eq!(*seen.0.lock().unwrap(), vec!["ours", "rival 0"]);
    }

    #[tokio::test]
    async fn hook_is_skipped_for_new_paths() {
        let store = MemoryStore::new();
        let seen = Seen::default();

        overwrite_with_retry(&store, "timestamp.json", "{}", "create", quick(), Some(&seen))
            .await
            .unwrap();

        assert!(seen.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn gives_up_after_bounded_retries() {
        let store = Contended {
            inner: MemoryStore::new(),
            rival_writes: Mutex::new(usize::MAX),
        };
        let result = store_with_retry(&store, "rankings.json", "new", "update", quick()).await;

        assert!(matches!(
            result,
            Err(CrawlerError::WriteConflict { attempts: 3, .. })
        ));
        assert_eq!(store.inner.writes().len(), 3);
    }

    #[tokio::test]
    async fn other_errors_abort_immediately() {
        struct Unauthorized(Mutex<usize>);

        #[async_trait]
        impl ArtifactStore for Unauthorized {
            async fn read(&self, _: &str) -> Result<Option<StoredObject>, StoreError> {
                Ok(None)
            }
            async fn write(&self, _: &str, _: &str, _: Option<&str>, _: &str) -> Result<String, StoreError> {
                *self.0.lock().unwrap() += 1;
                Err(StoreError::Api {
                    status: 401,
                    message: "bad credentials".to_string(),
                })
            }
            async fn list(&self, _: &str) -> Result<Vec<StoreEntry>, StoreError> {
                Ok(Vec::new())
            }
            async fn delete(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let store = Unauthorized(Mutex::new(0));
        let result = store_with_retry(&store, "rankings.json", "new", "update", quick()).await;

        assert!(matches!(result, Err(CrawlerError::Store(StoreError::Api { status: 401, .. }))));
        assert_eq!(*store.0.lock().unwrap(), 1);
    }
}
