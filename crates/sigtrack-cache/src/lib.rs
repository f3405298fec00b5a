//! # sigtrack-cache
//!
//! Tag-indexed cache for scope-filtered reads.
//!
//! Entries are JSON values keyed by string, each optionally expiring after a
//! TTL. A tag indexes the set of cache keys whose contents could be staled by
//! a mutation on that tag's scope dimension; invalidating the tag deletes
//! every indexed entry and then the tag's own record set.
//!
//! The write path invalidates a mutation's tags strictly before broadcasting
//! it, so a client that re-queries after receiving a push never sees the
//! pre-mutation cached value.

#![deny(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tags: HashMap<String, HashSet<String>>,
}

/// In-process cache with tag-based invalidation.
///
/// All operations take short, non-async critical sections; the lock is never
/// held across an await point by callers because no method is async.
#[derive(Default)]
pub struct TagCache {
    inner: Mutex<Inner>,
}

impl TagCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any previous entry. A `ttl` of
    /// `None` keeps the entry until it is invalidated or removed.
    pub fn insert(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        let _ = self.inner.lock().entries.insert(key.into(), entry);
    }

    /// Fetch a value. Expired entries are dropped on read and reported as
    /// misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                let _ = inner.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Associate a cache key with a tag. An entry may carry any number of
    /// tags; recording the same pair twice is a no-op.
    pub fn record(&self, tag: impl Into<String>, key: impl Into<String>) {
        let mut inner = self.inner.lock();
        let _ = inner.tags.entry(tag.into()).or_default().insert(key.into());
    }

    /// Delete every entry recorded under `tag`, then the tag's record set
    /// itself. Unknown tags are a no-op. Returns the number of entries
    /// actually removed.
    pub fn invalidate(&self, tag: &str) -> usize {
        let mut inner = self.inner.lock();
        let Some(keys) = inner.tags.remove(tag) else {
            return 0;
        };
        let mut removed = 0;
        for key in &keys {
            if inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        debug!(tag, removed, "cache tag invalidated");
        removed
    }

    /// Remove one entry directly, bypassing the tag index.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Number of live entries, counting expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get() {
        let cache = TagCache::new();
        cache.insert("k1", json!({"a": 1}), None);
        assert_eq!(cache.get("k1"), Some(json!({"a": 1})));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn insert_replaces() {
        let cache = TagCache::new();
        cache.insert("k1", json!(1), None);
        cache.insert("k1", json!(2), None);
        assert_eq!(cache.get("k1"), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = TagCache::new();
        cache.insert("k1", json!(1), Some(Duration::ZERO));
        assert_eq!(cache.get("k1"), None);
        // Dropped on read
        assert!(cache.is_empty());
    }

    #[test]
    fn unexpired_ttl_entry_hits() {
        let cache = TagCache::new();
        cache.insert("k1", json!(1), Some(Duration::from_secs(300)));
        assert_eq!(cache.get("k1"), Some(json!(1)));
    }

    #[test]
    fn invalidate_removes_tagged_entries() {
        let cache = TagCache::new();
        cache.insert("sigs:30000142:1001.1", json!([1, 2]), None);
        cache.insert("sigs:30000148:1001.1", json!([3]), None);
        cache.record("system:30000142", "sigs:30000142:1001.1");
        cache.record("system:30000148", "sigs:30000148:1001.1");

        assert_eq!(cache.invalidate("system:30000142"), 1);
        assert_eq!(cache.get("sigs:30000142:1001.1"), None);
        // Other scope untouched
        assert_eq!(cache.get("sigs:30000148:1001.1"), Some(json!([3])));
    }

    #[test]
    fn invalidate_unknown_tag_is_noop() {
        let cache = TagCache::new();
        cache.insert("k1", json!(1), None);
        assert_eq!(cache.invalidate("no_such_tag"), 0);
        assert_eq!(cache.get("k1"), Some(json!(1)));
    }

    #[test]
    fn invalidate_drops_tag_record_set() {
        let cache = TagCache::new();
        cache.record("mask:1001.1", "k1");
        cache.insert("k1", json!(1), None);
        assert_eq!(cache.invalidate("mask:1001.1"), 1);
        // Tag set is gone; re-inserting the entry does not resurrect it
        cache.insert("k1", json!(2), None);
        assert_eq!(cache.invalidate("mask:1001.1"), 0);
        assert_eq!(cache.get("k1"), Some(json!(2)));
    }

    #[test]
    fn entry_with_multiple_tags() {
        let cache = TagCache::new();
        cache.insert("snapshot", json!({"v": 1}), None);
        cache.record("system:30000142", "snapshot");
        cache.record("mask:1001.1", "snapshot");

        assert_eq!(cache.invalidate("mask:1001.1"), 1);
        assert_eq!(cache.get("snapshot"), None);
        // The other tag's set still references the key, but the entry is gone
        assert_eq!(cache.invalidate("system:30000142"), 0);
    }

    #[test]
    fn record_same_pair_twice() {
        let cache = TagCache::new();
        cache.insert("k1", json!(1), None);
        cache.record("t", "k1");
        cache.record("t", "k1");
        assert_eq!(cache.invalidate("t"), 1);
    }

    #[test]
    fn remove_bypasses_tags() {
        let cache = TagCache::new();
        cache.insert("k1", json!(1), None);
        cache.record("t", "k1");
        assert!(cache.remove("k1"));
        assert!(!cache.remove("k1"));
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn concurrent_access() {
        use std::sync::Arc;
        let cache = Arc::new(TagCache::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("k{i}:{j}");
                    cache.insert(key.clone(), json!(j), None);
                    cache.record(format!("tag{i}"), key);
                }
                cache.invalidate(&format!("tag{i}"))
            }));
        }
        let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(removed, 800);
        assert!(cache.is_empty());
    }
}
