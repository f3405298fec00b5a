//! Scope-keyed subscription index.
//!
//! Maps each `ScopeKey` to the set of connection ids currently interested in
//! it, with a reverse map so a connection can be moved or removed without
//! scanning every scope. The index stores ids only; connection lifetime is
//! the registry's concern.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use sigtrack_core::ScopeKey;

use crate::registry::ConnectionId;

#[derive(Default)]
struct Inner {
    by_scope: HashMap<ScopeKey, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, ScopeKey>,
}

/// Which connections are watching which scope.
///
/// A connection belongs to at most one scope at a time: subscribing replaces
/// any prior entry. Critical sections are short and never await.
#[derive(Default)]
pub struct SubscriptionIndex {
    inner: Mutex<Inner>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` under `scope`, moving it out of any previous scope.
    /// Repeating an identical subscription is a no-op.
    pub fn subscribe(&self, id: &ConnectionId, scope: ScopeKey) {
        let mut inner = self.inner.lock();
        if inner.by_connection.get(id) == Some(&scope) {
            return;
        }
        Self::detach(&mut inner, id);
        let _ = inner
            .by_scope
            .entry(scope.clone())
            .or_default()
            .insert(id.clone());
        let _ = inner.by_connection.insert(id.clone(), scope);
    }

    /// Remove `id` from its current scope, if any. Returns the scope it was
    /// subscribed to.
    pub fn unsubscribe(&self, id: &ConnectionId) -> Option<ScopeKey> {
        let mut inner = self.inner.lock();
        Self::detach(&mut inner, id)
    }

    /// Point-in-time snapshot of the audience for `scope`. A connection may
    /// close between the snapshot and a subsequent send; callers must treat
    /// send failures as connection-dead rather than trust the snapshot.
    pub fn subscribers_of(&self, scope: &ScopeKey) -> Vec<ConnectionId> {
        let inner = self.inner.lock();
        inner
            .by_scope
            .get(scope)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The scope `id` is currently subscribed to.
    pub fn scope_of(&self, id: &ConnectionId) -> Option<ScopeKey> {
        self.inner.lock().by_connection.get(id).cloned()
    }

    /// Number of scopes with at least one subscriber.
    pub fn scope_count(&self) -> usize {
        self.inner.lock().by_scope.len()
    }

    fn detach(inner: &mut Inner, id: &ConnectionId) -> Option<ScopeKey> {
        let scope = inner.by_connection.remove(id)?;
        if let Some(set) = inner.by_scope.get_mut(&scope) {
            let _ = set.remove(id);
            if set.is_empty() {
                let _ = inner.by_scope.remove(&scope);
            }
        }
        Some(scope)
    }
}
