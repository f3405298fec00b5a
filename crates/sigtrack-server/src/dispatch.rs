//! Per-scope fan-out of committed mutations.

use std::sync::Arc;

use chrono::Utc;
use sigtrack_core::MutationEvent;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;

/// Pushes each committed mutation to every connection subscribed to the
/// event's scope.
///
/// Runs inline on whichever thread commits the mutation, so two dispatches
/// issued in order from one thread reach every common subscriber in that
/// order. Fan-out is best-effort and independent per recipient: a dead
/// connection is closed and skipped, never allowed to abort delivery to the
/// rest. At-most-once: a connection that is mid-reconnect simply misses the
/// event and recovers via `initial_data` on resubscribe.
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to the current subscribers of its scope. Returns the
    /// number of connections the frame was handed to.
    pub fn dispatch(&self, event: &MutationEvent) -> usize {
        let subscribers = self.registry.subscribers_of(&event.scope);
        if subscribers.is_empty() {
            return 0;
        }

        // Serialize once, share the buffer across recipients.
        let frame = event.envelope(Utc::now().timestamp());
        let json: Arc<str> = match serde_json::to_string(&frame) {
            Ok(json) => Arc::from(json.as_str()),
            Err(error) => {
                warn!(%error, entity_type = %event.entity_type, "failed to serialize update frame");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for id in subscribers {
            match self.registry.send(&id, &json) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(conn_id = %id, %error, "send failed during broadcast");
                    dead.push(id);
                }
            }
        }
        for id in dead {
            self.registry.close(&id);
        }

        debug!(
            scope = %event.scope,
            entity_type = %event.entity_type,
            delivered,
            "broadcast update"
        );
        delivered
    }
}
