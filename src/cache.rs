use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::matrix::ScoreMatrix;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    timestamp: DateTime<Utc>,
    data: ScoreMatrix,
}

/// JSON file cache for loaded matrices, one file per key.
pub struct MatrixCache {
    dir: PathBuf,
}

impl MatrixCache {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\'], "_");
        self.dir.join(format!("{safe_key}.json"))
    }

    /// Returns the cached matrix unless it is missing, older than `max_age`, or unreadable.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<ScoreMatrix> {
        let path = self.entry_path(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!(key, "cache miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "ignoring corrupt cache entry");
                return None;
            }
        };

        if Utc::now() - entry.timestamp > max_age {
            debug!(key, cached_at = %entry.timestamp, "cache entry expired");
            return None;
        }

        debug!(key, "cache hit");
        Some(entry.data)
    }

    pub fn put(&self, key: &str, matrix: &ScoreMatrix) -> anyhow::Result<()> {
        self.put_at(key, matrix, Utc::now())
    }

    fn put_at(
        &self,
        key: &str,
        matrix: &ScoreMatrix,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let entry = CacheEntry {
            timestamp,
            data: matrix.clone(),
        };
        let path = self.entry_path(key);
        let raw = serde_json::to_string(&entry)?;
        std::fs::write(&path, raw)
            .with_context(|| format!("failed to write cache entry {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScoreMatrix {
        let mut matrix = ScoreMatrix::new(vec!["day01".to_string(), "day02".to_string()]).unwrap();
        matrix.push_row("ana", &[50.0, f64::NAN]).unwrap();
        matrix.push_row("bo", &[75.5, 20.0]).unwrap();
        matrix
    }

    #[test]
    fn fresh_entry_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::open(dir.path()).unwrap();
        cache.put("2025_B-DAT-200", &sample()).unwrap();

        let cached = cache.get("2025_B-DAT-200", Duration::minutes(5)).unwrap();
        assert_eq!(cached, sample());
        assert_eq!(cached.score_of("ana", "day02"), None);
    }

    #[test]
    fn expired_entry_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::open(dir.path()).unwrap();
        cache
            .put_at("old", &sample(), Utc::now() - Duration::minutes(10))
            .unwrap();

        assert!(cache.get("old", Duration::minutes(5)).is_none());
        assert!(cache.get("old", Duration::minutes(15)).is_some());
    }

    #[test]
    fn missing_and_corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::open(dir.path()).unwrap();
        assert!(cache.get("absent", Duration::minutes(5)).is_none());

        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(cache.get("broken", Duration::minutes(5)).is_none());
    }

    #[test]
    fn keys_with_separators_stay_in_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::open(dir.path()).unwrap();
        cache.put("data/exports\\2025", &sample()).unwrap();

        assert!(dir.path().join("data_exports_2025.json").exists());
        assert!(cache.get("data/exports\\2025", Duration::minutes(5)).is_some());
    }
}
