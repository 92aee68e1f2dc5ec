use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::StorageError;
use crate::utils::format_age;
use crate::models::YearMonth;

/// Prefix shared by every cache key; `clear(CACHE_KEY_PREFIX)` wipes the cache.
pub const CACHE_KEY_PREFIX: &str = "nogi_";

/// Schedules change often, so they are considered fresh for 30 minutes.
const SCHEDULE_TTL_MINUTES: i64 = 30;

/// Member data is reference data and stays fresh for a day.
const MEMBER_TTL_HOURS: i64 = 24;

pub fn schedule_key(year_month: YearMonth) -> String {
    format!("{}schedule_{}", CACHE_KEY_PREFIX, year_month)
}

pub fn member_key() -> String {
    format!("{}members", CACHE_KEY_PREFIX)
}

/// Time-to-live class of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Schedules,
    Members,
}

impl TtlClass {
    pub fn duration(&self) -> Duration {
        match self {
            TtlClass::Schedules => Duration::minutes(SCHEDULE_TTL_MINUTES),
            TtlClass::Members => Duration::hours(MEMBER_TTL_HOURS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            data,
            cached_at: now,
            expires_at: now + ttl,
        }
    }

    /// An entry is valid up to and including its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        format_age(self.age_minutes())
    }
}

/// Best-effort key-value cache with per-entry expiry, one JSON file per key.
///
/// Every method is infallible from the caller's point of view: storage
/// problems are logged and read as a miss.
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>, StorageError> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let cached: CachedData<T> = serde_json::from_str(&contents)?;
        Ok(Some(cached))
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        match self.read_entry(key) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(cache = key, error = %e, "Failed to read cache entry");
                None
            }
        }
    }

    /// Write a fully formed entry. Failures are logged and swallowed.
    pub(crate) fn put_entry<T: Serialize>(&self, key: &str, entry: &CachedData<T>) {
        let result = serde_json::to_string(entry)
            .map_err(StorageError::from)
            .and_then(|contents| {
                std::fs::write(self.cache_path(key), contents).map_err(StorageError::from)
            });

        if let Err(e) = result {
            warn!(cache = key, error = %e, "Failed to write cache entry");
        }
    }

    /// Store `value` under `key` with the TTL of its class.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: TtlClass) {
        self.put_entry(key, &CachedData::new(value, ttl.duration()));
    }

    /// Valid (non-expired) entry with its timestamps.
    ///
    /// Reading an expired entry removes it, so it is gone for later
    /// `get_stale` calls as well.
    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        let cached = self.load::<T>(key)?;
        if cached.is_valid_at(Utc::now()) {
            Some(cached)
        } else {
            debug!(cache = key, expired_at = %cached.expires_at, "Cache entry expired");
            self.remove(key);
            None
        }
    }

    /// Valid (non-expired) value for `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|cached| cached.data)
    }

    /// Raw entry regardless of expiry, for fallback after a failed fetch.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<CachedData<T>> {
        self.load(key)
    }

    /// When the entry for `key` was written, expired or not.
    pub fn cached_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.load::<serde_json::Value>(key).map(|cached| cached.cached_at)
    }

    pub fn remove(&self, key: &str) {
        let path = self.cache_path(key);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(cache = key, error = %e, "Failed to remove cache entry");
            }
        }
    }

    /// Remove every entry whose key starts with `prefix`. Returns the number removed.
    pub fn clear(&self, prefix: &str) -> usize {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.cache_dir.display(), error = %e, "Failed to list cache directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(key) = file_name.to_str().and_then(|name| name.strip_suffix(".json")) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(cache = key, error = %e, "Failed to remove cache entry"),
            }
        }
        debug!(prefix, removed, "Cleared cache entries");
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    fn expired<T>(data: T) -> CachedData<T> {
        let mut entry = CachedData::new(data, Duration::minutes(30));
        entry.cached_at = Utc::now() - Duration::minutes(61);
        entry.expires_at = Utc::now() - Duration::minutes(31);
        entry
    }

    #[test]
    fn test_round_trip() {
        let (_dir, store) = store();
        store.set("nogi_test", &vec![1, 2, 3], TtlClass::Schedules);
        assert_eq!(store.get::<Vec<i32>>("nogi_test"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_missing_key_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.get::<Vec<i32>>("nogi_missing"), None);
        assert!(store.get_stale::<Vec<i32>>("nogi_missing").is_none());
    }

    #[test]
    fn test_expired_entry_reads_as_absent_and_is_removed() {
        let (_dir, store) = store();
        store.put_entry("nogi_old", &expired(vec![9]));

        // Fallback path still sees it
        let stale = store.get_stale::<Vec<i32>>("nogi_old").unwrap();
        assert_eq!(stale.data, vec![9]);
        assert!(stale.is_expired());

        // Normal read treats it as absent and deletes it
        assert_eq!(store.get::<Vec<i32>>("nogi_old"), None);
        assert!(store.get_stale::<Vec<i32>>("nogi_old").is_none());
    }

    #[test]
    fn test_entry_valid_until_expiry_instant() {
        let entry = CachedData::new(1, Duration::minutes(30));
        assert!(entry.is_valid_at(entry.expires_at));
        assert!(!entry.is_valid_at(entry.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_ttl_classes() {
        assert_eq!(TtlClass::Schedules.duration(), Duration::minutes(30));
        assert_eq!(TtlClass::Members.duration(), Duration::hours(24));

        let (_dir, store) = store();
        store.set("nogi_members", &"x", TtlClass::Members);
        let entry = store.get_entry::<String>("nogi_members").unwrap();
        assert_eq!(entry.expires_at - entry.cached_at, Duration::hours(24));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let (_dir, store) = store();
        std::fs::write(store.dir().join("nogi_bad.json"), "{not json").unwrap();
        assert_eq!(store.get::<Vec<i32>>("nogi_bad"), None);
    }

    #[test]
    fn test_write_failure_is_silent() {
        let (dir, store) = store();
        // Remove the directory out from under the store
        std::fs::remove_dir_all(dir.path().join("cache")).unwrap();
        store.set("nogi_x", &1, TtlClass::Schedules);
        assert_eq!(store.get::<i32>("nogi_x"), None);
    }

    #[test]
    fn test_clear_by_prefix() {
        let (_dir, store) = store();
        store.set("nogi_schedule_202401", &1, TtlClass::Schedules);
        store.set("nogi_schedule_202402", &2, TtlClass::Schedules);
        store.set("nogi_members", &3, TtlClass::Members);
        store.set("other_key", &4, TtlClass::Members);

        assert_eq!(store.clear("nogi_schedule_"), 2);
        assert_eq!(store.get::<i32>("nogi_members"), Some(3));

        assert_eq!(store.clear(CACHE_KEY_PREFIX), 1);
        assert_eq!(store.get::<i32>("other_key"), Some(4));
    }

    #[test]
    fn test_cache_keys() {
        let ym = YearMonth::new(2024, 1).unwrap();
        assert_eq!(schedule_key(ym), "nogi_schedule_202401");
        assert_eq!(member_key(), "nogi_members");
    }

    #[test]
    fn test_persisted_entry_shape() {
        let (_dir, store) = store();
        store.set("nogi_shape", &vec!["a"], TtlClass::Schedules);
        let raw = std::fs::read_to_string(store.dir().join("nogi_shape.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("data").is_some());
        assert!(value.get("cachedAt").is_some());
        assert!(value.get("expiresAt").is_some());
    }

    #[test]
    fn test_age_display() {
        let mut cached = CachedData::new(vec![1], Duration::minutes(30));
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::hours(50);
        assert_eq!(cached.age_display(), "2d ago");
    }
}
