use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store_client::{ArtifactStore, StoreEntry, StoredObject};

/// In-process [`ArtifactStore`] with the same version-token semantics as the
/// remote one. Backs dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, StoredObject>,
    next_version: u64,
    writes: Vec<WriteRecord>,
}

/// One accepted or rejected write, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub path: String,
    pub expected_version: Option<String>,
    pub accepted: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places content at `path` without going through the version check.
    pub fn seed(&self, path: &str, content: &str) -> String {
        let mut state = self.lock();
        let version = state.bump();
        state.files.insert(
            path.to_string(),
            StoredObject {
                content: content.to_string(),
                version: version.clone(),
            },
        );
        version
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.lock().files.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        format!("v{}", self.next_version)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.get(path))
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        expected_version: Option<&str>,
        _message: &str,
    ) -> Result<String, StoreError> {
        let mut state = self.lock();
        let current = state.files.get(path).map(|f| f.version.clone());
        let accepted = current.as_deref() == expected_version;
        state.writes.push(WriteRecord {
            path: path.to_string(),
            expected_version: expected_version.map(str::to_string),
            accepted,
        });
        if !accepted {
            return Err(StoreError::Conflict(path.to_string()));
        }
        let version = state.bump();
        state.files.insert(
            path.to_string(),
            StoredObject {
                content: content.to_string(),
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn list(&self, dir: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .lock()
            .files
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix) && !path[prefix.len()..].contains('/'))
            .map(|(path, file)| StoreEntry {
                path: path.clone(),
                version: file.version.clone(),
            })
            .collect())
    }

    async fn delete(&self, path: &str, version: &str, _message: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        match state.files.get(path) {
            None => Err(StoreError::NotFound(path.to_string())),
            Some(file) if file.version != version => Err(StoreError::Conflict(path.to_string())),
            Some(_) => {
                state.files.remove(path);
                Ok(())
            }
        }
    }
}
