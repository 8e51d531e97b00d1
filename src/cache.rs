//! Best-effort disk cache for expensive lookups
//!
//! One JSON file per key, shape `{timestamp, payload}`. Reads that fail for
//! any reason (missing file, garbage content, stale entry) report a miss,
//! and writes that fail are logged and swallowed: callers must never see a
//! cache problem as an error.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    timestamp: f64,
    payload: T,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn now_secs() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Returns the payload stored under `key` if it is younger than
    /// `max_age`, and `None` in every other case.
    pub fn get<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
        let path = self.entry_path(key);
        let text = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry<T> = serde_json::from_str(&text).ok()?;
        let age = Self::now_secs() - entry.timestamp;
        if age > max_age.as_secs_f64() {
            debug!("cache entry '{}' is {:.0}s old, treating as absent", key, age);
            return None;
        }
        Some(entry.payload)
    }

    /// Stores `payload` under `key`, creating the cache directory if needed.
    /// Failures are logged and swallowed.
    pub fn set<T: Serialize>(&self, key: &str, payload: &T) {
        if let Err(e) = self.try_set(key, payload) {
            warn!("could not write cache entry '{}': {}", key, e);
        }
    }

    fn try_set<T: Serialize>(&self, key: &str, payload: &T) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            timestamp: Self::now_secs(),
            payload,
        };
        let text = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        std::fs::write(self.entry_path(key), text)
    }

    /// Returns the fresh cached payload for `key`, or awaits `compute`,
    /// stores its result best-effort, and returns it.
    ///
    /// There is no locking: concurrent callers may recompute redundantly,
    /// which is fine for cheap idempotent lookups.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        max_age: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key, max_age) {
            debug!("cache hit for '{}'", key);
            return Ok(hit);
        }
        let value = compute().await?;
        self.set(key, &value);
        Ok(value)
    }
}
