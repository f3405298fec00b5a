//! Connection ownership and per-connection send paths.
//!
//! Connections live in one owned table keyed by id; the subscription index
//! stores ids, never handles, so a closed connection can never dangle in a
//! scope entry. `close` is idempotent and also detaches the connection from
//! the index.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use sigtrack_core::ScopeKey;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::index::SubscriptionIndex;

/// Opaque connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Build an id from a raw string. Intended for tests and logs replay.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Why a send failed. Any variant means the connection should be closed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("connection {0} not found")]
    NotFound(ConnectionId),
    #[error("connection {0} is not open")]
    NotOpen(ConnectionId),
    #[error("send queue full for connection {0}")]
    QueueFull(ConnectionId),
    #[error("send channel closed for connection {0}")]
    ChannelClosed(ConnectionId),
}

/// One connected client. Owned exclusively by the registry.
pub struct Connection {
    /// Registry-assigned identity.
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    state: Mutex<ConnectionState>,
    user_id: Mutex<Option<i64>>,
    /// When this connection was accepted.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    dropped_frames: AtomicU64,
}

impl Connection {
    fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            tx,
            state: Mutex::new(ConnectionState::Open),
            user_id: Mutex::new(None),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Record the authenticated principal for this connection.
    pub fn set_user(&self, user_id: i64) {
        *self.user_id.lock() = Some(user_id);
    }

    /// The authenticated principal, if any.
    pub fn user_id(&self) -> Option<i64> {
        *self.user_id.lock()
    }

    /// Note inbound activity for the liveness monitor.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the liveness flag. Returns whether any activity was
    /// seen since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Frames dropped because the send queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn try_send(&self, frame: &Arc<str>) -> Result<(), SendError> {
        match self.tx.try_send(Arc::clone(frame)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SendError::QueueFull(self.id.clone()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SendError::ChannelClosed(self.id.clone()))
            }
        }
    }
}

/// Owns every live connection and the subscription index.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    index: SubscriptionIndex,
    send_queue: usize,
}

impl ConnectionRegistry {
    /// Create a registry whose connections buffer up to `send_queue`
    /// outbound frames each.
    pub fn new(send_queue: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            index: SubscriptionIndex::new(),
            send_queue,
        }
    }

    /// Register a new connection in state `Open` with no scope. Returns the
    /// id and the receiving end of its outbound frame queue.
    pub fn accept(&self) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.send_queue);
        let connection = Arc::new(Connection::new(id.clone(), tx));
        let _ = self.connections.write().insert(id.clone(), connection);
        (id, rx)
    }

    /// Look up a connection handle.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Close a connection: mark it `Closing`, detach it from any scope
    /// entry, release its send path, then mark it `Closed`. Safe to call
    /// repeatedly and concurrently with an in-flight broadcast.
    pub fn close(&self, id: &ConnectionId) {
        // Reject new sends and subscribes before touching the index.
        if let Some(connection) = self.get(id) {
            *connection.state.lock() = ConnectionState::Closing;
        }
        // Detach unconditionally: a subscribe racing an earlier close can
        // re-insert an id whose registry entry is already gone, and the next
        // close must sweep it.
        let scope = self.index.unsubscribe(id);
        let Some(connection) = self.connections.write().remove(id) else {
            return;
        };
        *connection.state.lock() = ConnectionState::Closed;
        // Dropping the registry's handle closes the queue once the writer
        // task also drops its receiver.
        info!(conn_id = %id, scope = ?scope.map(|s| s.canonical()), "connection closed");
    }

    /// Deliver a frame to one connection. Any error means the connection is
    /// dead; the caller is expected to `close` it.
    pub fn send(&self, id: &ConnectionId, frame: &Arc<str>) -> Result<(), SendError> {
        let Some(connection) = self.get(id) else {
            return Err(SendError::NotFound(id.clone()));
        };
        if connection.state() != ConnectionState::Open {
            return Err(SendError::NotOpen(id.clone()));
        }
        connection.try_send(frame)
    }

    /// Subscribe a connection to a scope (last subscribe wins).
    pub fn subscribe(&self, id: &ConnectionId, scope: ScopeKey) -> Result<(), SendError> {
        let Some(connection) = self.get(id) else {
            return Err(SendError::NotFound(id.clone()));
        };
        if connection.state() != ConnectionState::Open {
            return Err(SendError::NotOpen(id.clone()));
        }
        debug!(conn_id = %id, scope = %scope, "subscribed");
        self.index.subscribe(id, scope);
        Ok(())
    }

    /// Remove a connection's subscription, if any.
    pub fn unsubscribe(&self, id: &ConnectionId) -> Option<ScopeKey> {
        self.index.unsubscribe(id)
    }

    /// Snapshot of the audience for `scope`.
    pub fn subscribers_of(&self, scope: &ScopeKey) -> Vec<ConnectionId> {
        self.index.subscribers_of(scope)
    }

    /// The scope a connection is watching.
    pub fn scope_of(&self, id: &ConnectionId) -> Option<ScopeKey> {
        self.index.scope_of(id)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Number of scopes with at least one subscriber.
    pub fn scope_count(&self) -> usize {
        self.index.scope_count()
    }
}
