//! The single entry point the write path calls after a durable commit.

use std::sync::Arc;

use sigtrack_cache::TagCache;
use sigtrack_core::MutationEvent;
use tracing::debug;

use crate::dispatch::BroadcastDispatcher;

/// Invalidates a mutation's cache tags, then broadcasts it.
///
/// Holds explicit handles to its collaborators; the write path receives a
/// `MutationPublisher` at construction rather than reaching for a global.
/// The invalidate-then-dispatch order is the contract: a client that
/// re-queries after receiving the push must never be served the pre-mutation
/// cached value.
pub struct MutationPublisher {
    cache: Arc<TagCache>,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl MutationPublisher {
    /// Wire a publisher to its cache and dispatcher.
    pub fn new(cache: Arc<TagCache>, dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self { cache, dispatcher }
    }

    /// Publish one committed mutation. Returns the number of connections the
    /// update frame was delivered to.
    pub fn publish(&self, event: &MutationEvent) -> usize {
        // Both scope dimensions, before any frame leaves the process.
        for tag in event.scope.tags() {
            let _ = self.cache.invalidate(&tag);
        }
        debug!(scope = %event.scope, "scope tags invalidated");
        self.dispatcher.dispatch(event)
    }

    /// The cache reads are recorded against.
    pub fn cache(&self) -> &Arc<TagCache> {
        &self.cache
    }
}
