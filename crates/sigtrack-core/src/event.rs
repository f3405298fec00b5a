//! Committed mutations, ready for cache invalidation and fan-out.

use serde_json::Value;

use crate::entity::EntityType;
use crate::protocol::ServerFrame;
use crate::scope::ScopeKey;

/// One committed write to a signature or wormhole. Produced exactly once per
/// commit by the write path; immutable after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationEvent {
    /// Audience the mutation is visible to.
    pub scope: ScopeKey,
    pub entity_type: EntityType,
    /// The record as it should appear to clients. For deletes this may be a
    /// stub carrying just the id.
    pub payload: Value,
    /// Set when the record was removed rather than written.
    pub deleted: bool,
}

impl MutationEvent {
    /// Event for a created or updated record.
    pub fn upsert(scope: ScopeKey, entity_type: EntityType, payload: Value) -> Self {
        Self {
            scope,
            entity_type,
            payload,
            deleted: false,
        }
    }

    /// Event for a removed record.
    pub fn delete(scope: ScopeKey, entity_type: EntityType, payload: Value) -> Self {
        Self {
            scope,
            entity_type,
            payload,
            deleted: true,
        }
    }

    /// Build the `update` wire envelope for this event. Deletes get a
    /// `"deleted": true` marker folded into the payload object.
    pub fn envelope(&self, timestamp: i64) -> ServerFrame {
        let mut data = self.payload.clone();
        if self.deleted {
            if let Some(object) = data.as_object_mut() {
                let _ = object.insert("deleted".into(), Value::Bool(true));
            }
        }
        ServerFrame::Update {
            entity_type: self.entity_type,
            data,
            timestamp,
        }
    }
}
