use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AgentResult;

/// Transactional string key-value store over one JSON file. Every mutation
/// rewrites the whole file (temp file + rename) under a mutex, so readers
/// opening the file never see a half-written map. Missing or corrupt files
/// load as empty.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().await;
        self.read_map().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: &str) -> AgentResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;
        map.insert(key.to_owned(), value.to_owned());
        self.replace(&map).await
    }

    pub async fn remove(&self, key: &str) -> AgentResult<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await;
        map.remove(key);
        self.replace(&map).await
    }

    async fn read_map(&self) -> HashMap<String, String> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!("settings store not readable, starting empty: {err}");
                return HashMap::new();
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(map) => map,
            Err(err) => {
                debug!("settings store corrupt, starting empty: {err}");
                HashMap::new()
            }
        }
    }

    async fn replace(&self, map: &HashMap<String, String>) -> AgentResult<()> {
        let raw = serde_json::to_vec_pretty(map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
