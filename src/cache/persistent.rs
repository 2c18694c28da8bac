//! Persistent Cache Module
//!
//! Disk-backed key/value cache. Each entry is one JSON record named by the
//! SHA-256 of its logical key; writes go to a temporary file in the same
//! directory and are renamed into place, so readers only ever see complete
//! records.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::cache::entry::{is_expired, now_since_epoch};

const RECORD_EXTENSION: &str = "json";

// == Record ==
/// On-disk unit: one file per entry.
#[derive(Debug, Serialize, Deserialize)]
struct Record<V> {
    /// Logical key, kept for debugging
    key: String,
    value: V,
    /// Insertion time, seconds since the Unix epoch
    created_at: f64,
    /// Lifetime in seconds; 0 never expires
    ttl: f64,
}

impl<V> Record<V> {
    fn is_expired(&self) -> bool {
        is_expired(
            secs_to_duration(self.created_at),
            secs_to_duration(self.ttl),
            now_since_epoch(),
        )
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

enum Lookup<V> {
    Missing,
    Corrupt(serde_json::Error),
    Expired,
    Fresh(V),
}

// == Persistent Cache ==
/// Disk-backed cache with TTL.
///
/// Failures never reach the caller: a failed read is a miss, a failed write
/// is logged and skipped. Operations on one cache are serialized by its own
/// mutex and run on the blocking thread pool; the lock is held until the disk
/// work finishes, even when the calling future is dropped first.
#[derive(Debug, Clone)]
pub struct PersistentCache {
    dir: PathBuf,
    default_ttl: Duration,
    lock: Arc<Mutex<()>>,
}

impl PersistentCache {
    // == Constructor ==
    /// Opens a cache rooted at `dir`, creating the directory if absent.
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Duration) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            default_ttl,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// File holding the record for `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), RECORD_EXTENSION))
    }

    // == Get ==
    /// Returns the value stored under `key` if present, parseable and fresh.
    ///
    /// Expired records are deleted. Unparseable records are left on disk for
    /// inspection and reported as a miss.
    pub async fn get<V>(&self, key: &str) -> Option<V>
    where
        V: DeserializeOwned + Send + 'static,
    {
        let path = self.record_path(key);
        let lookup = self.blocking(move || -> io::Result<Lookup<V>> {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Lookup::Missing),
                Err(e) => return Err(e),
            };

            let record: Record<V> = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => return Ok(Lookup::Corrupt(e)),
            };

            if record.is_expired() {
                fs::remove_file(&path)?;
                return Ok(Lookup::Expired);
            }
            Ok(Lookup::Fresh(record.value))
        })
        .await;

        match lookup {
            Ok(Ok(Lookup::Fresh(value))) => {
                debug!(key, "Persistent cache hit");
                Some(value)
            }
            Ok(Ok(Lookup::Missing)) => None,
            Ok(Ok(Lookup::Expired)) => {
                debug!(key, "Persistent cache entry expired");
                None
            }
            Ok(Ok(Lookup::Corrupt(e))) => {
                warn!(key, error = %e, "Corrupted persistent cache record");
                None
            }
            Ok(Err(e)) => {
                warn!(key, error = %e, "Error reading persistent cache");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Persistent cache read task failed");
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`. `ttl` falls back to the cache default.
    pub async fn set<V>(&self, key: &str, value: &V, ttl: Option<Duration>)
    where
        V: Serialize + ?Sized,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let record = Record {
            key: key.to_string(),
            value,
            created_at: now_since_epoch().as_secs_f64(),
            ttl: ttl.as_secs_f64(),
        };

        let bytes = match serde_json::to_vec_pretty(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Cannot serialize persistent cache value");
                return;
            }
        };

        let dir = self.dir.clone();
        let path = self.record_path(key);
        match self.blocking(move || write_atomic(&dir, &path, &bytes)).await {
            Ok(Ok(())) => debug!(key, ?ttl, "Persistent cache set"),
            Ok(Err(e)) => warn!(key, error = %e, "Error writing persistent cache"),
            Err(e) => warn!(key, error = %e, "Persistent cache write task failed"),
        }
    }

    // == Delete ==
    /// Removes the record for `key`. Returns whether one was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let path = self.record_path(key);
        match self.blocking(move || fs::remove_file(path)).await {
            Ok(Ok(())) => {
                debug!(key, "Persistent cache delete");
                true
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => false,
            Ok(Err(e)) => {
                warn!(key, error = %e, "Error deleting persistent cache record");
                false
            }
            Err(e) => {
                warn!(key, error = %e, "Persistent cache delete task failed");
                false
            }
        }
    }

    // == Clear ==
    /// Removes every record. Returns the number removed.
    pub async fn clear(&self) -> usize {
        let dir = self.dir.clone();
        let result = self.blocking(move || -> io::Result<usize> {
            let mut removed = 0;
            for path in record_files(&dir)? {
                fs::remove_file(&path)?;
                removed += 1;
            }
            Ok(removed)
        })
        .await;

        match result {
            Ok(Ok(removed)) => {
                info!("Persistent cache cleared ({} records)", removed);
                removed
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error clearing persistent cache");
                0
            }
            Err(e) => {
                warn!(error = %e, "Persistent cache clear task failed");
                0
            }
        }
    }

    // == Cleanup Expired ==
    /// Deletes every expired record. Unparseable records are skipped and
    /// logged. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let dir = self.dir.clone();
        let result = self.blocking(move || -> io::Result<usize> {
            let mut removed = 0;
            for path in record_files(&dir)? {
                if sweep_record(&path) {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await;

        match result {
            Ok(Ok(removed)) => {
                if removed > 0 {
                    info!("Cleaned up {} expired persistent cache entries", removed);
                }
                removed
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error cleaning up persistent cache");
                0
            }
            Err(e) => {
                warn!(error = %e, "Persistent cache cleanup task failed");
                0
            }
        }
    }

    /// Number of record files on disk, expired or not.
    pub async fn len(&self) -> usize {
        let dir = self.dir.clone();
        match self.blocking(move || record_files(&dir)).await {
            Ok(Ok(files)) => files.len(),
            Ok(Err(e)) => {
                warn!(error = %e, "Error listing persistent cache");
                0
            }
            Err(e) => {
                warn!(error = %e, "Persistent cache listing task failed");
                0
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs `work` on the blocking pool under the directory lock. The owned
    /// guard moves into the task and is released only when `work` returns.
    async fn blocking<T, F>(&self, work: F) -> Result<T, JoinError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work()
        })
        .await
    }
}

// == Blocking Helpers ==
/// Writes `bytes` to a temp file in `dir`, then renames it onto `path`.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Record files in `dir`. Temp files have no `.json` extension and are skipped.
fn record_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Deletes `path` if it holds an expired record. Returns whether it did.
fn sweep_record(path: &Path) -> bool {
    let record: Record<IgnoredAny> = match fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
    {
        Ok(record) => record,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable persistent cache record");
            return false;
        }
    };

    if !record.is_expired() {
        return false;
    }
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Error removing expired persistent cache record");
            false
        }
    }
}
