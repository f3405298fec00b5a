//! Connection state and the client's local view of a scope.

use std::collections::BTreeMap;

use serde_json::Value;
use sigtrack_core::EntityType;

/// Lifecycle phase of the client's underlying connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectState {
    /// Not connected and not trying.
    Disconnected,
    /// Between attempts, or an attempt is in flight.
    Connecting,
    /// Subscribed session is live.
    Open,
    /// Shutdown requested, draining.
    Closing,
}

/// Records the client currently believes exist in its scope.
///
/// `initial_data` replaces the whole view. Updates upsert by id, and a
/// `"deleted": true` marker removes the record instead.
#[derive(Debug, Default)]
pub struct LocalCache {
    signatures: BTreeMap<i64, Value>,
    wormholes: BTreeMap<i64, Value>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole view with a fresh snapshot. Never merges: records
    /// deleted while the client was away must not survive a reconnect.
    pub fn apply_initial(&mut self, signatures: Vec<Value>, wormholes: Vec<Value>) {
        self.signatures = Self::index_by_id(signatures);
        self.wormholes = Self::index_by_id(wormholes);
    }

    /// Fold one update into the view. Records without a numeric `id` are
    /// ignored.
    pub fn apply_update(&mut self, entity_type: EntityType, data: &Value) {
        let Some(id) = data.get("id").and_then(Value::as_i64) else {
            return;
        };
        let records = match entity_type {
            EntityType::Signature => &mut self.signatures,
            EntityType::Wormhole => &mut self.wormholes,
        };
        if data.get("deleted").and_then(Value::as_bool) == Some(true) {
            let _ = records.remove(&id);
        } else {
            let _ = records.insert(id, data.clone());
        }
    }

    pub fn signature(&self, id: i64) -> Option<&Value> {
        self.signatures.get(&id)
    }

    pub fn wormhole(&self, id: i64) -> Option<&Value> {
        self.wormholes.get(&id)
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn wormhole_count(&self) -> usize {
        self.wormholes.len()
    }

    fn index_by_id(records: Vec<Value>) -> BTreeMap<i64, Value> {
        records
            .into_iter()
            .filter_map(|record| {
                let id = record.get("id").and_then(Value::as_i64)?;
                Some((id, record))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_replaces_everything() {
        let mut cache = LocalCache::new();
        cache.apply_initial(vec![json!({"id": 1}), json!({"id": 2})], vec![]);
        assert_eq!(cache.signature_count(), 2);

        // A later snapshot without record 2 drops it
        cache.apply_initial(vec![json!({"id": 1})], vec![json!({"id": 9})]);
        assert_eq!(cache.signature_count(), 1);
        assert!(cache.signature(2).is_none());
        assert_eq!(cache.wormhole_count(), 1);
    }

    #[test]
    fn update_upserts_by_id() {
        let mut cache = LocalCache::new();
        cache.apply_update(EntityType::Signature, &json!({"id": 1, "name": "old"}));
        cache.apply_update(EntityType::Signature, &json!({"id": 1, "name": "new"}));
        assert_eq!(cache.signature_count(), 1);
        assert_eq!(cache.signature(1).unwrap()["name"], "new");
    }

    #[test]
    fn delete_marker_removes_the_record() {
        let mut cache = LocalCache::new();
        cache.apply_update(EntityType::Wormhole, &json!({"id": 7}));
        cache.apply_update(EntityType::Wormhole, &json!({"id": 7, "deleted": true}));
        assert!(cache.wormhole(7).is_none());
    }

    #[test]
    fn delete_of_unknown_record_is_noop() {
        let mut cache = LocalCache::new();
        cache.apply_update(EntityType::Signature, &json!({"id": 3, "deleted": true}));
        assert_eq!(cache.signature_count(), 0);
    }

    #[test]
    fn records_without_id_are_ignored() {
        let mut cache = LocalCache::new();
        cache.apply_update(EntityType::Signature, &json!({"name": "stray"}));
        cache.apply_initial(vec![json!({"name": "stray"})], vec![]);
        assert_eq!(cache.signature_count(), 0);
    }
}
