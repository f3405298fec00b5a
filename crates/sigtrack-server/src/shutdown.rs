//! Graceful shutdown coordination.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fans a single shutdown signal out to every server task.
///
/// Each connection derives a child token from the root, so cancelling the
/// coordinator tears down writers, liveness monitors, and the accept loop
/// together, while closing one connection leaves the rest untouched.
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// Token for a per-connection task tree.
    pub fn connection_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// The root token, for the accept loop and signal watcher.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel everything when SIGINT arrives.
    pub async fn watch_signals(&self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, shutting down");
        }
        self.shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
