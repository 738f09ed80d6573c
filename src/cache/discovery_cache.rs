use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::capability::{CapabilityInfo, ServiceCapability};
use crate::cache::codec::{self, Reader};
use crate::error::AgentResult;
use crate::observability::metrics::get_metrics;

pub const LOOKUP_HIT: &str = "hit";
pub const LOOKUP_MISS: &str = "miss";
pub const LOOKUP_USER_MISMATCH: &str = "user_mismatch";

/// One persisted discovery record: the owning user plus per-capability
/// endpoint info. At most one record exists in the backing file; every
/// save replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryCacheRecord {
    pub user_id: String,
    pub capabilities: HashMap<String, CapabilityInfo>,
}

/// File-backed discovery cache. All access to the backing file goes through
/// one reader/writer lock: shared readers, exclusive writer, held only for
/// the duration of the single read or write. The lock is process-wide per
/// backing path, so independently constructed handles over the same file
/// still exclude each other.
///
/// The cache is advisory. A caller doing check-miss-refresh-save is not
/// atomic against concurrent refreshers; the last writer wins.
#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    path: PathBuf,
    lock: Arc<RwLock<()>>,
}

static FILE_LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<RwLock<()>>>>> = OnceLock::new();

/// One shared lock per backing path. Paths are keyed as given, not
/// canonicalized; the file may not exist yet.
fn lock_for(path: &Path) -> Arc<RwLock<()>> {
    let locks = FILE_LOCKS.get_or_init(|| StdMutex::new(HashMap::new()));
    let mut map = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.entry(path.to_path_buf()).or_default().clone()
}

impl DiscoveryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = lock_for(&path);
        Self { path, lock }
    }

    /// Read and decode the persisted record. Missing or malformed files are
    /// treated as a plain miss: the cache is best-effort, so nothing is
    /// surfaced to the caller beyond a debug trace.
    pub async fn load(&self) -> Option<DiscoveryCacheRecord> {
        let _guard = self.lock.read().await;

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("discovery cache not readable, treating as miss: {err}");
                return None;
            }
        };

        match decode(&bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!("discovery cache malformed, treating as miss: {err}");
                None
            }
        }
    }

    /// Encode and persist a fresh record, replacing whatever was there.
    /// The write lands in a temp file first and is renamed over the target
    /// so readers never observe a partial record.
    pub async fn create_and_save(
        &self,
        user_id: &str,
        capabilities: HashMap<String, CapabilityInfo>,
    ) -> AgentResult<DiscoveryCacheRecord> {
        let record = DiscoveryCacheRecord {
            user_id: user_id.to_owned(),
            capabilities,
        };
        let bytes = encode(&record);

        let _guard = self.lock.write().await;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(record)
    }

    /// Composed read: a hit requires the record to exist, belong to
    /// `current_user`, and contain the capability. Anything else is a miss
    /// and the caller is expected to re-run discovery and save.
    pub async fn lookup(
        &self,
        capability: ServiceCapability,
        current_user: &str,
    ) -> Option<CapabilityInfo> {
        let metrics = get_metrics().await;

        let record = match self.load().await {
            Some(record) => record,
            None => {
                metrics.cache_lookups.with_label_values(&[LOOKUP_MISS]).inc();
                return None;
            }
        };

        if record.user_id != current_user {
            // cache is for another user
            debug!(
                "discovery cache owned by '{}', current user '{}': refresh required",
                record.user_id, current_user
            );
            metrics
                .cache_lookups
                .with_label_values(&[LOOKUP_USER_MISMATCH])
                .inc();
            return None;
        }

        match record.capabilities.get(capability.as_str()) {
            Some(info) => {
                metrics.cache_lookups.with_label_values(&[LOOKUP_HIT]).inc();
                Some(info.clone())
            }
            None => {
                metrics.cache_lookups.with_label_values(&[LOOKUP_MISS]).inc();
                None
            }
        }
    }
}

fn encode(record: &DiscoveryCacheRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    codec::write_string(&mut buf, &record.user_id);
    codec::write_i32(&mut buf, record.capabilities.len() as i32);
    for (key, info) in &record.capabilities {
        codec::write_string(&mut buf, key);
        codec::write_string(&mut buf, &info.service_resource_id);
        codec::write_string(&mut buf, &info.service_endpoint_uri);
        codec::write_string(&mut buf, &info.service_api_version);
    }
    buf
}

fn decode(bytes: &[u8]) -> io::Result<DiscoveryCacheRecord> {
    let mut reader = Reader::new(bytes);

    let user_id = reader.read_string()?;
    let entry_count = reader.read_i32()?;
    if entry_count < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative entry count: {entry_count}"),
        ));
    }

    // the count is untrusted input; each entry takes at least 16 bytes
    // (four length prefixes), so cap the pre-allocation at what the
    // remaining buffer could possibly hold
    let plausible = (entry_count as usize).min(reader.remaining() / 16);
    let mut capabilities = HashMap::with_capacity(plausible);
    for _ in 0..entry_count {
        let key = reader.read_string()?;
        let service_resource_id = reader.read_string()?;
        let service_endpoint_uri = reader.read_string()?;
        let service_api_version = reader.read_string()?;
        capabilities.insert(
            key,
            CapabilityInfo {
                service_resource_id,
                service_endpoint_uri,
                service_api_version,
            },
        );
    }

    Ok(DiscoveryCacheRecord { user_id, capabilities })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_capabilities() -> HashMap<String, CapabilityInfo> {
        let mut map = HashMap::new();
        map.insert(
            "Mail".to_owned(),
            CapabilityInfo::new(
                "https://outlook.office365.com/",
                "https://outlook.office365.com/api/v1.0",
                "v1.0",
            ),
        );
        map.insert(
            "MyFiles".to_owned(),
            CapabilityInfo::new(
                "https://contoso-my.sharepoint.com/",
                "https://contoso-my.sharepoint.com/_api/v1.0/me",
                "v1.0",
            ),
        );
        map
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));

        let saved = cache
            .create_and_save("user-a", sample_capabilities())
            .await
            .unwrap();
        let loaded = cache.load().await.unwrap();

        assert_eq!(saved, loaded);
        assert_eq!(loaded.user_id, "user-a");
        assert_eq!(loaded.capabilities.len(), 2);
    }

    #[tokio::test]
    async fn empty_record_round_trips() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));

        cache.create_and_save("user-a", HashMap::new()).await.unwrap();
        let loaded = cache.load().await.unwrap();

        assert_eq!(loaded.user_id, "user-a");
        assert!(loaded.capabilities.is_empty());
    }

    #[tokio::test]
    async fn non_ascii_strings_round_trip() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));

        let mut map = HashMap::new();
        map.insert(
            "Mail".to_owned(),
            CapabilityInfo::new("rés-id", "https://exämple.test/api", "v1.0"),
        );
        cache.create_and_save("usér-ä", map).await.unwrap();

        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.user_id, "usér-ä");
        assert_eq!(loaded.capabilities["Mail"].service_resource_id, "rés-id");
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn malformed_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DiscoveryInfo.bin");
        tokio::fs::write(&path, b"not a cache record").await.unwrap();

        let cache = DiscoveryCache::new(&path);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn truncated_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DiscoveryInfo.bin");

        let cache = DiscoveryCache::new(&path);
        cache
            .create_and_save("user-a", sample_capabilities())
            .await
            .unwrap();

        let full = tokio::fs::read(&path).await.unwrap();
        tokio::fs::write(&path, &full[..full.len() / 2]).await.unwrap();

        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn huge_declared_entry_count_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DiscoveryInfo.bin");

        // a tiny file claiming i32::MAX entries must be rejected without
        // allocating for the declared count
        let mut buf = Vec::new();
        codec::write_string(&mut buf, "user-a");
        codec::write_i32(&mut buf, i32::MAX);
        tokio::fs::write(&path, &buf).await.unwrap();

        let cache = DiscoveryCache::new(&path);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn independent_handles_over_one_path_share_the_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DiscoveryInfo.bin");

        let writer_cache = DiscoveryCache::new(&path);
        let reader_cache = DiscoveryCache::new(&path);
        assert!(Arc::ptr_eq(&writer_cache.lock, &reader_cache.lock));

        let record_a = writer_cache
            .create_and_save("user-a", sample_capabilities())
            .await
            .unwrap();
        let record_b = DiscoveryCacheRecord {
            user_id: "user-b".to_owned(),
            capabilities: HashMap::new(),
        };

        let writer = tokio::spawn(async move {
            for i in 0..50 {
                if i % 2 == 0 {
                    writer_cache
                        .create_and_save("user-b", HashMap::new())
                        .await
                        .unwrap();
                } else {
                    writer_cache
                        .create_and_save("user-a", sample_capabilities())
                        .await
                        .unwrap();
                }
            }
        });
        let reader = tokio::spawn(async move {
            for _ in 0..50 {
                let loaded = reader_cache.load().await.expect("record should always exist");
                assert!(
                    loaded == record_a || loaded == record_b,
                    "reader saw a mixed record: {loaded:?}"
                );
            }
        });

        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn lookup_misses_for_other_user() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));
        cache
            .create_and_save("user-a", sample_capabilities())
            .await
            .unwrap();

        assert!(cache
            .lookup(ServiceCapability::Mail, "user-a")
            .await
            .is_some());
        // same file, different logged-in user: must never leak user-a's endpoints
        assert!(cache
            .lookup(ServiceCapability::Mail, "user-b")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn lookup_misses_for_unknown_capability() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));
        cache
            .create_and_save("user-a", sample_capabilities())
            .await
            .unwrap();

        assert!(cache
            .lookup(ServiceCapability::Calendar, "user-a")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn lookup_on_empty_store_is_a_miss_not_a_panic() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));
        assert!(cache
            .lookup(ServiceCapability::Mail, "user-a")
            .await
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_never_see_torn_records() {
        let dir = tempdir().unwrap();
        let cache = DiscoveryCache::new(dir.path().join("DiscoveryInfo.bin"));

        let record_a = cache
            .create_and_save("user-a", sample_capabilities())
            .await
            .unwrap();
        let record_b = DiscoveryCacheRecord {
            user_id: "user-b".to_owned(),
            capabilities: HashMap::new(),
        };

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    if i % 2 == 0 {
                        cache
                            .create_and_save("user-b", HashMap::new())
                            .await
                            .unwrap();
                    } else {
                        cache
                            .create_and_save("user-a", sample_capabilities())
                            .await
                            .unwrap();
                    }
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let record_a = record_a.clone();
            let record_b = record_b.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let loaded = cache.load().await.expect("record should always exist");
                    assert!(
                        loaded == record_a || loaded == record_b,
                        "reader saw a mixed record: {loaded:?}"
                    );
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
