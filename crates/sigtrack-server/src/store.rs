//! Collaborator seams for the gateway, plus an in-memory store.
//!
//! `AccessPolicy` and `ScopeStore` are the two interfaces the core consumes:
//! permission checks before honoring a subscribe, and scope-filtered reads
//! for `initial_data`. `MemoryStore` implements the read side over process
//! memory with cache read-through, and a write side that commits a record
//! and then runs the invalidate-then-dispatch protocol via the publisher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sigtrack_cache::TagCache;
use sigtrack_core::{EntityType, MutationEvent, ScopeKey, Signature, Wormhole};
use tracing::{debug, warn};

use crate::publish::MutationPublisher;

/// How long scope snapshots stay cached without being invalidated.
const SNAPSHOT_TTL: Duration = Duration::from_secs(300);

/// Storage failure surfaced to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Everything a freshly subscribed client needs to render the scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeSnapshot {
    pub signatures: Vec<Signature>,
    pub wormholes: Vec<Wormhole>,
}

/// Permission check consulted before honoring a `subscribe`.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Whether `user_id` (if authenticated) may watch `scope`.
    async fn has_access(&self, scope: &ScopeKey, user_id: Option<i64>) -> bool;
}

/// Permits any non-empty mask. Stands in for the real permission
/// collaborator, which resolves owner/admin masks elsewhere.
pub struct OpenAccess;

#[async_trait]
impl AccessPolicy for OpenAccess {
    async fn has_access(&self, scope: &ScopeKey, _user_id: Option<i64>) -> bool {
        !scope.mask_id.is_empty()
    }
}

/// Read path used to populate `initial_data`.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    /// All records visible to `scope`.
    async fn query_by_scope(&self, scope: &ScopeKey) -> Result<ScopeSnapshot, StoreError>;
}

#[derive(Default)]
struct Records {
    signatures: HashMap<i64, Signature>,
    wormholes: HashMap<i64, Wormhole>,
}

/// In-memory record store with cache read-through and publish-on-commit.
pub struct MemoryStore {
    records: Mutex<Records>,
    publisher: Arc<MutationPublisher>,
}

impl MemoryStore {
    /// Create an empty store that publishes through `publisher`.
    pub fn new(publisher: Arc<MutationPublisher>) -> Self {
        Self {
            records: Mutex::new(Records::default()),
            publisher,
        }
    }

    fn snapshot_key(scope: &ScopeKey) -> String {
        format!("snapshot:{}", scope.canonical())
    }

    fn collect_snapshot(&self, scope: &ScopeKey) -> ScopeSnapshot {
        let records = self.records.lock();
        let signatures = records
            .signatures
            .values()
            .filter(|sig| sig.system_id == scope.system_id && sig.mask_id == scope.mask_id)
            .cloned()
            .collect();
        let wormholes = records
            .wormholes
            .values()
            .filter(|wh| wh.connects(scope.system_id) && wh.mask_id == scope.mask_id)
            .cloned()
            .collect();
        ScopeSnapshot {
            signatures,
            wormholes,
        }
    }

    /// Create or replace a signature, then invalidate and broadcast. Returns
    /// the number of connections notified.
    pub fn put_signature(&self, signature: Signature) -> usize {
        let scope = ScopeKey::new(signature.mask_id.clone(), signature.system_id);
        let payload = match serde_json::to_value(&signature) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to serialize signature");
                return 0;
            }
        };
        {
            let mut records = self.records.lock();
            let _ = records.signatures.insert(signature.id, signature);
        }
        self.publisher
            .publish(&MutationEvent::upsert(scope, EntityType::Signature, payload))
    }

    /// Delete a signature by id within a mask. No-op for unknown ids.
    pub fn delete_signature(&self, id: i64, mask_id: &str) -> usize {
        let removed = {
            let mut records = self.records.lock();
            match records.signatures.get(&id) {
                Some(sig) if sig.mask_id == mask_id => records.signatures.remove(&id),
                _ => None,
            }
        };
        let Some(signature) = removed else {
            return 0;
        };
        let scope = ScopeKey::new(signature.mask_id, signature.system_id);
        self.publisher.publish(&MutationEvent::delete(
            scope,
            EntityType::Signature,
            serde_json::json!({"id": id}),
        ))
    }

    /// Create or replace a wormhole, broadcasting on the from-system scope.
    pub fn put_wormhole(&self, wormhole: Wormhole) -> usize {
        let scope = ScopeKey::new(wormhole.mask_id.clone(), wormhole.from_system_id);
        let payload = match serde_json::to_value(&wormhole) {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "failed to serialize wormhole");
                return 0;
            }
        };
        {
            let mut records = self.records.lock();
            let _ = records.wormholes.insert(wormhole.id, wormhole);
        }
        self.publisher
            .publish(&MutationEvent::upsert(scope, EntityType::Wormhole, payload))
    }

    /// Delete a wormhole by id within a mask. No-op for unknown ids.
    pub fn delete_wormhole(&self, id: i64, mask_id: &str) -> usize {
        let removed = {
            let mut records = self.records.lock();
            match records.wormholes.get(&id) {
                Some(wh) if wh.mask_id == mask_id => records.wormholes.remove(&id),
                _ => None,
            }
        };
        let Some(wormhole) = removed else {
            return 0;
        };
        let scope = ScopeKey::new(wormhole.mask_id, wormhole.from_system_id);
        self.publisher.publish(&MutationEvent::delete(
            scope,
            EntityType::Wormhole,
            serde_json::json!({"id": id}),
        ))
    }
}

#[async_trait]
impl ScopeStore for MemoryStore {
    async fn query_by_scope(&self, scope: &ScopeKey) -> Result<ScopeSnapshot, StoreError> {
        let cache = self.publisher.cache();
        let key = Self::snapshot_key(scope);

        if let Some(cached) = cache.get(&key) {
            if let Ok(snapshot) = serde_json::from_value::<CachedSnapshot>(cached) {
                debug!(scope = %scope, "snapshot served from cache");
                return Ok(snapshot.into());
            }
            // Unparseable entry: drop it and fall through to a fresh read
            let _ = cache.remove(&key);
        }

        let snapshot = self.collect_snapshot(scope);
        let cached = CachedSnapshot::from(&snapshot);
        match serde_json::to_value(&cached) {
            Ok(value) => {
                cache.insert(key.clone(), value, Some(SNAPSHOT_TTL));
                cache.record(scope.system_tag(), key.clone());
                cache.record(scope.mask_tag(), key);
            }
            Err(error) => warn!(%error, "failed to cache scope snapshot"),
        }
        Ok(snapshot)
    }
}

/// Serialized form of a snapshot as stored in the cache.
#[derive(serde::Serialize, serde::Deserialize)]
struct CachedSnapshot {
    signatures: Vec<Signature>,
    wormholes: Vec<Wormhole>,
}

impl From<&ScopeSnapshot> for CachedSnapshot {
    fn from(snapshot: &ScopeSnapshot) -> Self {
        Self {
            signatures: snapshot.signatures.clone(),
            wormholes: snapshot.wormholes.clone(),
        }
    }
}

impl From<CachedSnapshot> for ScopeSnapshot {
    fn from(cached: CachedSnapshot) -> Self {
        Self {
            signatures: cached.signatures,
            wormholes: cached.wormholes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::dispatch::BroadcastDispatcher;
    use crate::registry::ConnectionRegistry;

    fn scope() -> ScopeKey {
        ScopeKey::new("1001.1", 30_000_142)
    }

    fn make_signature(id: i64, name: &str) -> Signature {
        let t = Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap();
        Signature {
            id,
            system_id: 30_000_142,
            signature_id: format!("SIG-{id:03}"),
            kind: "data".into(),
            name: name.into(),
            description: None,
            created_by: None,
            created_by_name: None,
            life_time: t,
            life_left: t,
            modified_time: t,
            mask_id: "1001.1".into(),
        }
    }

    fn make_wormhole(id: i64, from: i64, to: i64) -> Wormhole {
        let t = Utc.with_ymd_and_hms(2026, 8, 24, 12, 0, 0).unwrap();
        Wormhole {
            id,
            from_system_id: from,
            to_system_id: to,
            signature_id: format!("WH-{id:03}"),
            kind: "K162".into(),
            life: 1.0,
            mass: 0,
            created_by: None,
            created_by_name: None,
            created_time: t,
            modified_time: t,
            mask_id: "1001.1".into(),
        }
    }

    fn setup() -> (Arc<ConnectionRegistry>, Arc<TagCache>, MemoryStore) {
        let registry = Arc::new(ConnectionRegistry::new(16));
        let cache = Arc::new(TagCache::new());
        let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));
        let publisher = Arc::new(MutationPublisher::new(Arc::clone(&cache), dispatcher));
        let store = MemoryStore::new(publisher);
        (registry, cache, store)
    }

    #[tokio::test]
    async fn open_access_denies_empty_mask() {
        let policy = OpenAccess;
        assert!(policy.has_access(&scope(), None).await);
        assert!(!policy.has_access(&ScopeKey::new("", 30_000_142), None).await);
    }

    #[tokio::test]
    async fn query_filters_by_scope() {
        let (_registry, _cache, store) = setup();
        let _ = store.put_signature(make_signature(1, "in scope"));
        let mut other = make_signature(2, "other system");
        other.system_id = 30_000_148;
        let _ = store.put_signature(other);
        let mut foreign = make_signature(3, "other mask");
        foreign.mask_id = "2002.1".into();
        let _ = store.put_signature(foreign);

        let snapshot = store.query_by_scope(&scope()).await.unwrap();
        assert_eq!(snapshot.signatures.len(), 1);
        assert_eq!(snapshot.signatures[0].name, "in scope");
    }

    #[tokio::test]
    async fn wormholes_match_on_either_end() {
        let (_registry, _cache, store) = setup();
        let _ = store.put_wormhole(make_wormhole(1, 30_000_142, 31_000_001));
        let _ = store.put_wormhole(make_wormhole(2, 31_000_001, 30_000_142));
        let _ = store.put_wormhole(make_wormhole(3, 31_000_001, 31_000_002));

        let snapshot = store.query_by_scope(&scope()).await.unwrap();
        let mut ids: Vec<i64> = snapshot.wormholes.iter().map(|wh| wh.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn snapshot_is_cached_and_tagged() {
        let (_registry, cache, store) = setup();
        let _ = store.put_signature(make_signature(1, "cached"));

        let _ = store.query_by_scope(&scope()).await.unwrap();
        assert!(cache.get("snapshot:1001.1_30000142").is_some());

        // Invalidating the system tag clears the snapshot
        let _ = cache.invalidate("system:30000142");
        assert!(cache.get("snapshot:1001.1_30000142").is_none());
    }

    #[tokio::test]
    async fn write_invalidates_cached_snapshot() {
        let (_registry, _cache, store) = setup();
        let _ = store.put_signature(make_signature(1, "before"));
        let first = store.query_by_scope(&scope()).await.unwrap();
        assert_eq!(first.signatures[0].name, "before");

        // Commit a change; the publish path must drop the cached snapshot
        let _ = store.put_signature(make_signature(1, "after"));
        let second = store.query_by_scope(&scope()).await.unwrap();
        assert_eq!(second.signatures[0].name, "after");
    }

    #[tokio::test]
    async fn put_signature_broadcasts_to_scope() {
        let (registry, _cache, store) = setup();
        let (id, mut rx) = registry.accept();
        registry.subscribe(&id, scope()).unwrap();

        assert_eq!(store.put_signature(make_signature(1, "fresh")), 1);
        let frame = rx.try_recv().unwrap();
        assert!(frame.contains(r#""action":"update""#));
        assert!(frame.contains(r#""type":"signature""#));
    }

    #[tokio::test]
    async fn delete_signature_broadcasts_marker() {
        let (registry, _cache, store) = setup();
        let _ = store.put_signature(make_signature(5, "doomed"));
        let (id, mut rx) = registry.accept();
        registry.subscribe(&id, scope()).unwrap();

        assert_eq!(store.delete_signature(5, "1001.1"), 1);
        let frame = rx.try_recv().unwrap();
        assert!(frame.contains(r#""deleted":true"#));
    }

    #[tokio::test]
    async fn delete_unknown_signature_is_noop() {
        let (_registry, _cache, store) = setup();
        assert_eq!(store.delete_signature(99, "1001.1"), 0);
    }

    #[tokio::test]
    async fn delete_respects_mask() {
        let (_registry, _cache, store) = setup();
        let _ = store.put_signature(make_signature(5, "kept"));
        assert_eq!(store.delete_signature(5, "2002.1"), 0);
        let snapshot = store.query_by_scope(&scope()).await.unwrap();
        assert_eq!(snapshot.signatures.len(), 1);
    }

    #[tokio::test]
    async fn delete_wormhole_roundtrip() {
        let (_registry, _cache, store) = setup();
        let _ = store.put_wormhole(make_wormhole(7, 30_000_142, 31_000_001));
        let _ = store.delete_wormhole(7, "1001.1");
        let snapshot = store.query_by_scope(&scope()).await.unwrap();
        assert!(snapshot.wormholes.is_empty());
    }
}
