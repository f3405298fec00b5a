//! Per-connection liveness monitoring.
//!
//! The writer task sends protocol-level pings; inbound pongs (or any inbound
//! frame) mark the connection alive. This monitor checks the flag at each
//! interval and reports a timeout once `timeout / interval` consecutive
//! checks pass with no sign of life. It detects silently dead transports and
//! idle-timeout proxies; a clean transport close is handled by the reader.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::registry::Connection;

/// Outcome of a liveness watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessOutcome {
    /// No inbound activity within the timeout window.
    TimedOut,
    /// The connection is being torn down for another reason.
    Cancelled,
}

/// Watch one connection until it times out or is cancelled.
pub async fn watch_liveness(
    connection: Arc<Connection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> LivenessOutcome {
    let mut ticks = time::interval(interval);
    ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so the connection gets a
    // full interval before its first check.
    ticks.tick().await;

    let interval_ms = interval.as_millis().max(1);
    let allowed_misses = (timeout.as_millis() / interval_ms).max(1);
    let mut misses: u128 = 0;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                if connection.check_alive() {
                    misses = 0;
                } else {
                    misses += 1;
                    if misses >= allowed_misses {
                        return LivenessOutcome::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => return LivenessOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;

    fn make_connection() -> Arc<Connection> {
        let registry = ConnectionRegistry::new(8);
        let (id, _rx) = registry.accept();
        registry.get(&id).unwrap()
    }

    #[tokio::test]
    async fn cancelled_before_first_check() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = watch_liveness(
            conn,
            Duration::from_secs(30),
            Duration::from_secs(90),
            cancel,
        )
        .await;
        assert_eq!(outcome, LivenessOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_times_out() {
        let conn = make_connection();
        // Consume the initial alive flag so every check is a miss
        let _ = conn.check_alive();
        let cancel = CancellationToken::new();

        let outcome = watch_liveness(
            conn,
            Duration::from_secs(30),
            Duration::from_secs(90),
            cancel,
        )
        .await;
        assert_eq!(outcome, LivenessOutcome::TimedOut);
    }

    #[tokio::test]
    async fn active_connection_never_times_out() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_liveness(
            Arc::clone(&conn),
            Duration::from_millis(20),
            Duration::from_millis(60),
            cancel.clone(),
        ));

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            conn.mark_alive();
        }
        cancel.cancel();
        assert_eq!(watcher.await.unwrap(), LivenessOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn one_pong_resets_the_miss_count() {
        let conn = make_connection();
        let _ = conn.check_alive();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_liveness(
            Arc::clone(&conn),
            Duration::from_secs(30),
            Duration::from_secs(90),
            cancel.clone(),
        ));

        // Two misses accumulate, then a pong arrives
        tokio::time::sleep(Duration::from_secs(65)).await;
        conn.mark_alive();
        tokio::time::sleep(Duration::from_secs(40)).await;

        // Without the reset, 90s of misses would have fired by now
        assert!(!watcher.is_finished());
        cancel.cancel();
        assert_eq!(watcher.await.unwrap(), LivenessOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_during_wait() {
        let conn = make_connection();
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_liveness(
            conn,
            Duration::from_secs(60),
            Duration::from_secs(180),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(watcher.await.unwrap(), LivenessOutcome::Cancelled);
    }
}
