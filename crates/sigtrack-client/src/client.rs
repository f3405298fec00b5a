//! Reconnecting WebSocket client.
//!
//! `ReconnectingClient` owns a background task that dials the server,
//! subscribes to one scope, folds the resulting stream into a [`LocalCache`],
//! and redials with exponential backoff when the transport drops. Observers
//! consume [`ClientEvent`]s from the channel returned by
//! [`ReconnectingClient::connect`].

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use sigtrack_core::{ClientFrame, EntityType, ScopeKey, ServerFrame};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, DEFAULT_CEILING, DEFAULT_FLOOR};
use crate::state::{LocalCache, ReconnectState};

type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How the client connects and behaves across reconnects.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Full WebSocket URL, e.g. `ws://host:8080/ws`.
    pub url: String,
    /// The scope to subscribe to on every (re)connect.
    pub scope: ScopeKey,
    /// Delay before the first reconnect attempt.
    pub floor: Duration,
    /// Upper bound on the reconnect delay.
    pub ceiling: Duration,
    /// Application-level ping cadence while connected.
    pub ping_interval: Duration,
    /// Consecutive failed connect attempts before giving up.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, scope: ScopeKey) -> Self {
        Self {
            url: url.into(),
            scope,
            floor: DEFAULT_FLOOR,
            ceiling: DEFAULT_CEILING,
            ping_interval: Duration::from_secs(30),
            max_attempts: Some(5),
        }
    }
}

/// What the background task reports to the embedding application.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// Transport established; subscribe is on the wire.
    Connected,
    /// The server acknowledged the subscription.
    Subscribed { mask_id: String, system_id: i64 },
    /// Snapshot applied to the local cache.
    InitialData { signatures: usize, wormholes: usize },
    /// One update applied to the local cache.
    Update {
        entity_type: EntityType,
        data: Value,
        timestamp: i64,
    },
    /// Keepalive answered.
    Pong { timestamp: i64 },
    /// The server rejected a frame.
    ServerError { message: String },
    /// A connect attempt failed. `attempt` counts consecutive failures.
    ConnectFailed { attempt: u32, message: String },
    /// An open session ended without a local `disconnect` call.
    Disconnected { will_retry: bool },
    /// Retry budget exhausted; the task has stopped.
    GaveUp,
}

/// Client handle. Dropping it does not stop the background task; call
/// [`disconnect`](Self::disconnect) for an orderly shutdown.
pub struct ReconnectingClient {
    cancel: CancellationToken,
    state: Arc<Mutex<ReconnectState>>,
    cache: Arc<Mutex<LocalCache>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectingClient {
    /// Spawn the connection task. Events arrive on the returned receiver
    /// until the task stops.
    pub fn connect(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let cancel = CancellationToken::new();
        let state = Arc::new(Mutex::new(ReconnectState::Connecting));
        let cache = Arc::new(Mutex::new(LocalCache::new()));
        let (events, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_client(
            config,
            Arc::clone(&state),
            Arc::clone(&cache),
            events,
            cancel.clone(),
        ));

        (
            Self {
                cancel,
                state,
                cache,
                task: Mutex::new(Some(task)),
            },
            rx,
        )
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> ReconnectState {
        *self.state.lock()
    }

    /// Read from the local view of the scope.
    pub fn with_cache<R>(&self, f: impl FnOnce(&LocalCache) -> R) -> R {
        f(&self.cache.lock())
    }

    /// Stop the client. Sends a close frame if a session is open, then waits
    /// for the task to finish. Safe to call more than once, including after
    /// the task already stopped on its own.
    pub async fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            *self.state.lock() = ReconnectState::Closing;
            self.cancel.cancel();
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        // The task may have finished before the cancel (e.g. retry budget
        // exhausted); the terminal state is Disconnected either way.
        *self.state.lock() = ReconnectState::Disconnected;
    }
}

async fn run_client(
    config: ClientConfig,
    state: Arc<Mutex<ReconnectState>>,
    cache: Arc<Mutex<LocalCache>>,
    events: mpsc::UnboundedSender<ClientEvent>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(config.floor, config.ceiling);
    let mut failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        *state.lock() = ReconnectState::Connecting;

        let connected = tokio::select! {
            () = cancel.cancelled() => break,
            result = connect_async(&config.url) => result,
        };

        match connected {
            Ok((ws, _)) => {
                backoff.reset();
                failures = 0;
                *state.lock() = ReconnectState::Open;
                info!(url = %config.url, "connected");
                let _ = events.send(ClientEvent::Connected);

                let end = run_session(ws, &config, &cache, &events, &cancel).await;
                if matches!(end, SessionEnd::Cancelled) {
                    break;
                }
                debug!("session dropped, scheduling reconnect");
                let _ = events.send(ClientEvent::Disconnected { will_retry: true });
            }
            Err(error) => {
                failures += 1;
                warn!(%error, attempt = failures, "connect failed");
                let _ = events.send(ClientEvent::ConnectFailed {
                    attempt: failures,
                    message: error.to_string(),
                });
                if let Some(max) = config.max_attempts {
                    if failures >= max {
                        let _ = events.send(ClientEvent::GaveUp);
                        break;
                    }
                }
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    *state.lock() = ReconnectState::Disconnected;
}

enum SessionEnd {
    /// Transport closed or errored; the caller schedules a reconnect.
    Dropped,
    /// Local shutdown; no reconnect.
    Cancelled,
}

async fn run_session(
    mut ws: Transport,
    config: &ClientConfig,
    cache: &Mutex<LocalCache>,
    events: &mpsc::UnboundedSender<ClientEvent>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let subscribe = ClientFrame::Subscribe {
        mask_id: config.scope.mask_id.clone(),
        system_id: config.scope.system_id,
    };
    if send_frame(&mut ws, &subscribe).await.is_err() {
        return SessionEnd::Dropped;
    }

    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            _ = ping.tick() => {
                if send_frame(&mut ws, &ClientFrame::Ping).await.is_err() {
                    return SessionEnd::Dropped;
                }
            }
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(text.as_str(), cache, events);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                _ => return SessionEnd::Dropped,
            },
        }
    }
}

async fn send_frame(ws: &mut Transport, frame: &ClientFrame) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    ws.send(Message::text(json)).await.map_err(|error| {
        debug!(%error, "send failed");
    })
}

fn handle_frame(text: &str, cache: &Mutex<LocalCache>, events: &mpsc::UnboundedSender<ClientEvent>) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(%error, "unparseable server frame");
            return;
        }
    };
    match frame {
        ServerFrame::Subscribed { mask_id, system_id } => {
            let _ = events.send(ClientEvent::Subscribed { mask_id, system_id });
        }
        ServerFrame::Unsubscribed => {
            debug!("unsubscribed");
        }
        ServerFrame::InitialData {
            signatures,
            wormholes,
        } => {
            let counts = (signatures.len(), wormholes.len());
            cache.lock().apply_initial(signatures, wormholes);
            let _ = events.send(ClientEvent::InitialData {
                signatures: counts.0,
                wormholes: counts.1,
            });
        }
        ServerFrame::Update {
            entity_type,
            data,
            timestamp,
        } => {
            cache.lock().apply_update(entity_type, &data);
            let _ = events.send(ClientEvent::Update {
                entity_type,
                data,
                timestamp,
            });
        }
        ServerFrame::Pong { timestamp } => {
            let _ = events.send(ClientEvent::Pong { timestamp });
        }
        ServerFrame::Error { error } => {
            let _ = events.send(ClientEvent::ServerError { message: error });
        }
    }
}
