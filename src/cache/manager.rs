//! Nutrition cache backed by a single locked JSON file
//!
//! Provides a `NutritionCache` that stores estimated nutrition keyed by the
//! normalized food description, with a fixed 10-day TTL enforced lazily on
//! read. There is no background sweeper.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::normalize::normalize;
use crate::data::Nutrition;
use crate::store::{JsonStore, StoreError};

/// Time-to-live for cache entries in days
pub const CACHE_TTL_DAYS: i64 = 10;

/// Entry stored on disk for one normalized key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached nutrition, without any from-cache marker
    pub nutrition: Nutrition,
    /// When the entry was inserted or last refreshed
    ///
    /// `None` when the stored timestamp is missing or unparseable; such an
    /// entry counts as expired.
    #[serde(
        rename = "cachedAt",
        alias = "cached_at",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub cached_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Whether the entry is older than the TTL at `now`, or undated
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.cached_at {
            Some(cached_at) => now - cached_at > ttl(),
            None => true,
        }
    }
}

/// Reads a timestamp without failing the whole file on a bad value
///
/// Accepts RFC 3339, or a zone-less ISO 8601 date-time taken as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let Some(text) = raw.as_str() else {
        return Ok(None);
    };

    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        });
    Ok(parsed)
}

/// The whole cache file: normalized key to entry
pub type CacheStore = BTreeMap<String, CacheEntry>;

/// Result of a cache hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedNutrition {
    /// Normalized key the entry was found under
    pub key: String,
    /// The cached nutrition
    pub nutrition: Nutrition,
    /// When the data was cached
    pub cached_at: DateTime<Utc>,
    /// Always `true` on values returned by [`NutritionCache::get`]; never stored
    pub from_cache: bool,
}

/// Summary of what the cache file currently holds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// The fixed entry lifetime
pub fn ttl() -> Duration {
    Duration::days(CACHE_TTL_DAYS)
}

/// File-backed nutrition cache
///
/// Every operation is one critical section on the backing file's lock:
/// load, optionally mutate, optionally save. Handles are cheap to clone and
/// any number of them, in this or other processes, may point at one file.
#[derive(Debug, Clone)]
pub struct NutritionCache {
    store: JsonStore<CacheStore>,
}

impl NutritionCache {
    /// Creates a cache backed by the JSON file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    /// Sets how long an operation waits for the file lock
    pub fn with_lock_timeout(mut self, lock_timeout: StdDuration) -> Self {
        self.store = self.store.with_lock_timeout(lock_timeout);
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Reads the whole cache file
    pub fn load_store(&self) -> Result<CacheStore, StoreError> {
        self.store.load()
    }

    /// Replaces the whole cache file
    pub fn save_store(&self, store: &CacheStore) -> Result<(), StoreError> {
        self.store.save(store)
    }

    /// Looks up the entry for a food description
    ///
    /// # Returns
    /// * `Ok(Some(CachedNutrition))` with `from_cache = true` for a fresh entry
    /// * `Ok(None)` if there is no entry, or the entry had expired; an expired
    ///   entry is removed from the file before returning
    /// * `Err(StoreError)` if the file is unreadable or the lock unavailable
    pub fn get(&self, food_text: &str) -> Result<Option<CachedNutrition>, StoreError> {
        let key = normalize(food_text);
        let guard = self.store.lock()?;
        let mut store = self.store.load_locked(&guard)?;

        let Some(entry) = store.get(&key) else {
            debug!(key = %key, "nutrition cache miss");
            return Ok(None);
        };

        let stamp = entry.cached_at;
        let fresh = stamp.filter(|_| !entry.is_expired_at(Utc::now()));
        if let Some(cached_at) = fresh {
            debug!(key = %key, "nutrition cache hit");
            return Ok(Some(CachedNutrition {
                nutrition: entry.nutrition.clone(),
                cached_at,
                from_cache: true,
                key,
            }));
        }

        info!(key = %key, cached_at = ?stamp, "nutrition cache entry expired, removing");
        store.remove(&key);
        self.store.save_locked(&guard, &store)?;
        Ok(None)
    }

    /// Stores nutrition for a food description, replacing any prior entry
    ///
    /// Non-finite and negative amounts are stored as zero.
    pub fn set(&self, food_text: &str, nutrition: &Nutrition) -> Result<(), StoreError> {
        let key = normalize(food_text);
        let entry = CacheEntry {
            nutrition: nutrition.clone().clamped(),
            cached_at: Some(Utc::now()),
        };

        self.store.update(|store| store.insert(key.clone(), entry))?;

        info!(key = %key, "nutrition cached");
        Ok(())
    }

    /// Sanitizes an untrusted payload and stores the result
    ///
    /// Malformed values become zeros; this never fails on content.
    pub fn set_untrusted(&self, food_text: &str, payload: &Value) -> Result<Nutrition, StoreError> {
        let nutrition = Nutrition::from_untrusted(payload);
        self.set(food_text, &nutrition)?;
        Ok(nutrition)
    }

    /// Removes the entry for a food description
    ///
    /// Returns `true` if an entry was removed. Nothing is written when the
    /// key is absent.
    pub fn delete(&self, food_text: &str) -> Result<bool, StoreError> {
        let key = normalize(food_text);
        let guard = self.store.lock()?;
        let mut store = self.store.load_locked(&guard)?;

        if store.remove(&key).is_none() {
            debug!(key = %key, "nothing to delete");
            return Ok(false);
        }

        self.store.save_locked(&guard, &store)?;
        info!(key = %key, "nutrition cache entry deleted");
        Ok(true)
    }

    /// Drops every expired entry in one pass
    ///
    /// Returns how many entries were removed; the file is only rewritten if
    /// that is more than zero. Never called implicitly.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let guard = self.store.lock()?;
        let mut store = self.store.load_locked(&guard)?;
        let now = Utc::now();

        let before = store.len();
        store.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - store.len();

        if removed > 0 {
            self.store.save_locked(&guard, &store)?;
            info!(removed, "purged expired nutrition cache entries");
        }
        Ok(removed)
    }

    /// Counts entries and reports the age range
    pub fn stats(&self) -> Result<CacheStats, StoreError> {
        let store = self.load_store()?;
        let now = Utc::now();

        Ok(CacheStats {
            entries: store.len(),
            expired: store.values().filter(|e| e.is_expired_at(now)).count(),
            oldest: store.values().filter_map(|e| e.cached_at).min(),
            newest: store.values().filter_map(|e| e.cached_at).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_cache() -> (NutritionCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = NutritionCache::new(temp_dir.path().join("nutrition_cache.json"));
        (cache, temp_dir)
    }

    fn chicken() -> Nutrition {
        let mut micros = BTreeMap::new();
        micros.insert("iron".to_string(), 1.0);
        Nutrition {
            calories: 165,
            protein: 31.0,
            carbs: 0.0,
            fat: 3.6,
            micros,
        }
    }

    /// Writes an entry with a chosen age straight into the file
    fn insert_aged(cache: &NutritionCache, key: &str, age: Duration) {
        let mut store = cache.load_store().expect("Should load store");
        store.insert(
            key.to_string(),
            CacheEntry {
                nutrition: chicken(),
                cached_at: Some(Utc::now() - age),
            },
        );
        cache.save_store(&store).expect("Should save store");
    }

    #[test]
    fn test_set_then_get_returns_same_nutrition() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("Grilled Chicken", &chicken()).expect("Set should succeed");
        let hit = cache
            .get("Grilled Chicken")
            .expect("Get should succeed")
            .expect("Entry should be present");

        assert_eq!(hit.nutrition, chicken());
        assert_eq!(hit.key, "grilled chicken");
        assert!(hit.from_cache);
    }

    #[test]
    fn test_get_collides_near_duplicate_text() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("Grilled Chicken", &chicken()).expect("Set should succeed");
        let hit = cache
            .get("grilled   chicken!!")
            .expect("Get should succeed")
            .expect("Normalized key should collide");

        assert_eq!(hit.nutrition, chicken());
        assert!(hit.from_cache);
    }

    #[test]
    fn test_get_missing_key_returns_none() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(cache.get("tofu").expect("Get should succeed").is_none());
        assert!(!cache.path().exists(), "A miss must not create the file");
    }

    #[test]
    fn test_from_cache_marker_is_not_persisted() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("egg", &chicken()).expect("Set should succeed");
        cache.get("egg").expect("Get should succeed");

        let content = fs::read_to_string(cache.path()).expect("Should read file");
        assert!(!content.contains("from_cache"));
        assert!(!content.contains("fromCache"));
    }

    #[test]
    fn test_file_layout_uses_cached_at_camel_case() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("Rice", &chicken()).expect("Set should succeed");

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(cache.path()).expect("Should read file"))
                .expect("File should be JSON");
        let entry = &raw["rice"];
        assert_eq!(entry["nutrition"]["calories"], 165);
        assert_eq!(entry["nutrition"]["micros"]["iron"], 1.0);
        let stamp = entry["cachedAt"].as_str().expect("cachedAt should be a string");
        assert!(stamp.ends_with('Z'), "timestamp should be UTC: {}", stamp);
    }

    #[test]
    fn test_reads_snake_case_timestamp_files() {
        let (cache, _temp_dir) = create_test_cache();
        let stamp = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let legacy = json!({
            "apple": {
                "nutrition": { "calories": 95, "protein": 0.5, "carbs": 25.0, "fat": 0.3, "micros": {} },
                "cached_at": stamp
            }
        });
        fs::write(cache.path(), legacy.to_string()).expect("Should write file");

        let hit = cache.get("Apple").expect("Get should succeed").expect("Should hit");

        assert_eq!(hit.nutrition.calories, 95);
    }

    #[test]
    fn test_expired_entry_is_miss_and_removed() {
        let (cache, _temp_dir) = create_test_cache();
        insert_aged(&cache, "old soup", Duration::days(CACHE_TTL_DAYS) + Duration::minutes(1));
        insert_aged(&cache, "fresh soup", Duration::days(1));

        assert!(cache.get("Old Soup").expect("Get should succeed").is_none());

        let store = cache.load_store().expect("Should load store");
        assert!(!store.contains_key("old soup"), "Expired entry should be gone");
        assert!(store.contains_key("fresh soup"), "Other entries stay");
    }

    #[test]
    fn test_entry_just_inside_ttl_is_served() {
        let (cache, _temp_dir) = create_test_cache();
        insert_aged(&cache, "stew", Duration::days(CACHE_TTL_DAYS) - Duration::minutes(1));

        assert!(cache.get("stew").expect("Get should succeed").is_some());
    }

    #[test]
    fn test_fresh_hit_does_not_rewrite_file() {
        let (cache, _temp_dir) = create_test_cache();
        let stamp = Utc::now().to_rfc3339();
        // Compact JSON: any save would pretty-print it.
        let compact = format!(
            r#"{{"toast":{{"nutrition":{{"calories":80,"protein":3.0,"carbs":14.0,"fat":1.0,"micros":{{}}}},"cachedAt":"{}"}}}}"#,
            stamp
        );
        fs::write(cache.path(), &compact).expect("Should write file");

        assert!(cache.get("toast").expect("Get should succeed").is_some());
        assert!(cache.get("bagel").expect("Get should succeed").is_none());

        assert_eq!(fs::read_to_string(cache.path()).expect("Should read file"), compact);
    }

    #[test]
    fn test_set_replaces_entry_entirely() {
        let (cache, _temp_dir) = create_test_cache();
        cache.set("oats", &chicken()).expect("First set should succeed");

        let plain = Nutrition {
            calories: 150,
            ..Default::default()
        };
        cache.set("Oats!", &plain).expect("Second set should succeed");

        let hit = cache.get("oats").expect("Get should succeed").expect("Should hit");
        assert_eq!(hit.nutrition, plain);
        assert!(hit.nutrition.micros.is_empty(), "No merge with the old entry");
        assert_eq!(cache.load_store().expect("Should load").len(), 1);
    }

    #[test]
    fn test_set_untrusted_sanitizes_payload() {
        let (cache, _temp_dir) = create_test_cache();

        cache
            .set_untrusted("yogurt", &json!({ "calories": "150", "protein": "12mg" }))
            .expect("Set should succeed");
        cache
            .set_untrusted("granola", &json!({ "calories": 90.8, "protein": "n/a" }))
            .expect("Unparseable fields must not fail");

        let yogurt = cache.get("yogurt").unwrap().unwrap().nutrition;
        assert_eq!(yogurt.calories, 150);
        assert_eq!(yogurt.protein, 12.0);

        let granola = cache.get("granola").unwrap().unwrap().nutrition;
        assert_eq!(granola.calories, 90);
        assert_eq!(granola.protein, 0.0);
    }

    #[test]
    fn test_delete_absent_key_returns_false_without_writing() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(!cache.delete("pizza").expect("Delete should succeed"));
        assert!(!cache.path().exists(), "Deleting nothing must not write");
    }

    #[test]
    fn test_delete_present_key_removes_it() {
        let (cache, _temp_dir) = create_test_cache();
        cache.set("Pizza Slice", &chicken()).expect("Set should succeed");

        assert!(cache.delete("pizza slice!").expect("Delete should succeed"));
        assert!(cache.get("Pizza Slice").expect("Get should succeed").is_none());
        assert!(!cache.delete("pizza slice").expect("Second delete should succeed"));
    }

    #[test]
    fn test_corrupt_file_is_an_error_for_every_operation() {
        let (cache, _temp_dir) = create_test_cache();
        fs::write(cache.path(), "not json at all").expect("Should write file");

        assert_eq!(cache.load_store().unwrap_err().kind(), StoreErrorKind::Unreadable);
        assert_eq!(cache.get("x").unwrap_err().kind(), StoreErrorKind::Unreadable);
        assert_eq!(
            cache.set("x", &chicken()).unwrap_err().kind(),
            StoreErrorKind::Unreadable
        );
        assert_eq!(cache.delete("x").unwrap_err().kind(), StoreErrorKind::Unreadable);

        // The corrupt file is left for inspection, not overwritten.
        assert_eq!(
            fs::read_to_string(cache.path()).expect("Should read file"),
            "not json at all"
        );
    }

    #[test]
    fn test_purge_expired_removes_only_stale_entries() {
        let (cache, _temp_dir) = create_test_cache();
        insert_aged(&cache, "a", Duration::days(30));
        insert_aged(&cache, "b", Duration::days(11));
        insert_aged(&cache, "c", Duration::hours(2));

        assert_eq!(cache.purge_expired().expect("Purge should succeed"), 2);
        let store = cache.load_store().expect("Should load");
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["c"]);

        assert_eq!(cache.purge_expired().expect("Second purge should succeed"), 0);
    }

    #[test]
    fn test_stats_reports_counts_and_range() {
        let (cache, _temp_dir) = create_test_cache();
        assert_eq!(cache.stats().expect("Stats should succeed").entries, 0);

        insert_aged(&cache, "a", Duration::days(12));
        insert_aged(&cache, "b", Duration::hours(1));

        let stats = cache.stats().expect("Stats should succeed");
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.expired, 1);
        assert!(stats.oldest < stats.newest);
    }

    #[test]
    fn test_lock_held_elsewhere_reports_unavailable() {
        let (cache, temp_dir) = create_test_cache();
        let cache = cache.with_lock_timeout(StdDuration::from_millis(50));
        let other: JsonStore<CacheStore> =
            JsonStore::new(temp_dir.path().join("nutrition_cache.json"));

        let _held = other.lock().expect("Should take the lock");

        assert_eq!(cache.get("egg").unwrap_err().kind(), StoreErrorKind::Unavailable);
    }

    #[test]
    fn test_set_with_non_finite_amounts_keeps_file_readable() {
        let (cache, _temp_dir) = create_test_cache();
        let rice = Nutrition {
            calories: 206,
            ..Default::default()
        };
        cache.set("rice", &rice).expect("Set should succeed");

        let mut broken = chicken();
        broken.protein = f64::NAN;
        broken.fat = f64::INFINITY;
        broken.micros.insert("zinc".to_string(), f64::NEG_INFINITY);
        cache.set("soup", &broken).expect("Set should succeed");

        let rice_hit = cache.get("rice").expect("Unrelated key must stay readable");
        assert_eq!(rice_hit.expect("Should hit").nutrition, rice);

        let soup = cache.get("soup").unwrap().expect("Should hit").nutrition;
        assert_eq!(soup.protein, 0.0);
        assert_eq!(soup.fat, 0.0);
        assert_eq!(soup.micros["zinc"], 0.0);
        assert_eq!(soup.micros["iron"], 1.0);
    }

    #[test]
    fn test_bad_timestamp_entry_is_expired_not_fatal() {
        let (cache, _temp_dir) = create_test_cache();
        let stamp = Utc::now().to_rfc3339();
        let file = json!({
            "apple": {
                "nutrition": { "calories": 95, "protein": 0.5, "carbs": 25.0, "fat": 0.3 },
                "cachedAt": "not-a-date"
            },
            "pear": {
                "nutrition": { "calories": 100, "protein": 0.6, "carbs": 27.0, "fat": 0.2 }
            },
            "rice": {
                "nutrition": { "calories": 206, "protein": 4.3, "carbs": 45.0, "fat": 0.4 },
                "cachedAt": stamp
            }
        });
        fs::write(cache.path(), file.to_string()).expect("Should write file");

        let rice = cache.get("rice").expect("Good entry should load").expect("Should hit");
        assert_eq!(rice.nutrition.calories, 206);

        assert!(cache.get("apple").expect("Get should succeed").is_none());
        assert!(!cache.load_store().unwrap().contains_key("apple"), "Evicted on read");

        cache.set("egg", &chicken()).expect("Set should still work");
        assert_eq!(cache.purge_expired().expect("Purge should succeed"), 1);
        let keys: Vec<String> = cache.load_store().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["egg".to_string(), "rice".to_string()]);
    }

    #[test]
    fn test_zone_less_timestamp_is_read_as_utc() {
        let (cache, _temp_dir) = create_test_cache();
        let stamp = (Utc::now() - Duration::hours(2))
            .naive_utc()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let file = json!({
            "oats": {
                "nutrition": { "calories": 150, "protein": 5.0, "carbs": 27.0, "fat": 3.0 },
                "cached_at": stamp
            }
        });
        fs::write(cache.path(), file.to_string()).expect("Should write file");

        assert!(cache.get("oats").expect("Get should succeed").is_some());
    }
}
