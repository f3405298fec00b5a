//! Axum WebSocket gateway.
//!
//! One reader loop per connection parses inbound frames and drives the
//! subscribe / unsubscribe / ping protocol; a writer task drains the
//! connection's outbound queue into the socket and sends periodic pings.
//! Per-connection faults close that connection only.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use sigtrack_core::{ClientFrame, ScopeKey, ServerFrame};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::heartbeat::{LivenessOutcome, watch_liveness};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::shutdown::ShutdownCoordinator;
use crate::store::{AccessPolicy, ScopeStore};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection arena and subscription index.
    pub registry: Arc<ConnectionRegistry>,
    /// Read path for `initial_data`.
    pub store: Arc<dyn ScopeStore>,
    /// Permission check for `subscribe`.
    pub access: Arc<dyn AccessPolicy>,
    /// Shutdown fan-out.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// Assemble gateway state from its collaborators.
    pub fn new(
        config: ServerConfig,
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn ScopeStore>,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            registry,
            store,
            access,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the shutdown coordinator fires.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(state.config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "sigtrack server listening");
    let token = state.shutdown.token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    Ok(())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.count(),
        state.registry.scope_count(),
    ))
}

/// GET /ws — WebSocket upgrade.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_message_size = state.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection from accept to close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    if state.registry.count() >= state.config.max_connections {
        warn!(
            limit = state.config.max_connections,
            "connection limit reached, refusing client"
        );
        return;
    }

    let (id, mut rx) = state.registry.accept();
    let Some(connection) = state.registry.get(&id) else {
        return;
    };
    info!(conn_id = %id, "websocket client connected");

    let cancel = state.shutdown.connection_token();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: outbound queue -> socket, plus periodic protocol pings.
    let writer_cancel = cancel.clone();
    let ping_interval = state.config.heartbeat_interval();
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut liveness = tokio::spawn(watch_liveness(
        Arc::clone(&connection),
        state.config.heartbeat_interval(),
        state.config.heartbeat_timeout(),
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    connection.mark_alive();
                    handle_frame(&state, &id, text.as_str()).await;
                }
                Some(Ok(Message::Pong(_) | Message::Ping(_))) => connection.mark_alive(),
                Some(Ok(Message::Binary(_))) => {
                    send_frame(&state, &id, &ServerFrame::Error {
                        error: "Invalid message format".into(),
                    });
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(error)) => {
                    debug!(conn_id = %id, %error, "websocket receive error");
                    break;
                }
            },
            outcome = &mut liveness => {
                if matches!(outcome, Ok(LivenessOutcome::TimedOut)) {
                    warn!(conn_id = %id, "liveness timeout, closing connection");
                }
                break;
            }
        }
    }

    // Tear down this connection's task tree only.
    cancel.cancel();
    state.registry.close(&id);
    let _ = writer.await;
    info!(conn_id = %id, "websocket client disconnected");
}

/// Parse and act on one inbound text frame.
async fn handle_frame(state: &AppState, id: &ConnectionId, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(error) => {
            debug!(conn_id = %id, %error, "malformed inbound frame");
            send_frame(
                state,
                id,
                &ServerFrame::Error {
                    error: "Invalid message format".into(),
                },
            );
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { mask_id, system_id } => {
            handle_subscribe(state, id, ScopeKey::new(mask_id, system_id)).await;
        }
        ClientFrame::Unsubscribe => {
            let _ = state.registry.unsubscribe(id);
            send_frame(state, id, &ServerFrame::Unsubscribed);
        }
        ClientFrame::Ping => {
            send_frame(
                state,
                id,
                &ServerFrame::Pong {
                    timestamp: Utc::now().timestamp(),
                },
            );
        }
    }
}

/// Honor a subscribe: permission check, index entry, initial data, ack.
async fn handle_subscribe(state: &AppState, id: &ConnectionId, scope: ScopeKey) {
    let user_id = state.registry.get(id).and_then(|conn| conn.user_id());
    if !state.access.has_access(&scope, user_id).await {
        warn!(conn_id = %id, scope = %scope, "subscribe denied");
        send_frame(
            state,
            id,
            &ServerFrame::Error {
                error: "Access denied".into(),
            },
        );
        return;
    }

    if state.registry.subscribe(id, scope.clone()).is_err() {
        return;
    }

    match state.store.query_by_scope(&scope).await {
        Ok(snapshot) => {
            let signatures = snapshot
                .signatures
                .iter()
                .filter_map(|sig| serde_json::to_value(sig).ok())
                .collect();
            let wormholes = snapshot
                .wormholes
                .iter()
                .filter_map(|wh| serde_json::to_value(wh).ok())
                .collect();
            send_frame(
                state,
                id,
                &ServerFrame::InitialData {
                    signatures,
                    wormholes,
                },
            );
        }
        Err(error) => {
            warn!(conn_id = %id, scope = %scope, %error, "failed to load initial data");
            send_frame(
                state,
                id,
                &ServerFrame::Error {
                    error: "Failed to load initial data".into(),
                },
            );
        }
    }

    send_frame(
        state,
        id,
        &ServerFrame::Subscribed {
            mask_id: scope.mask_id,
            system_id: scope.system_id,
        },
    );
}

/// Queue one frame toward a connection, closing it on failure.
fn send_frame(state: &AppState, id: &ConnectionId, frame: &ServerFrame) {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(error) => {
            warn!(%error, "failed to serialize server frame");
            return;
        }
    };
    let shared: Arc<str> = Arc::from(json.as_str());
    if let Err(error) = state.registry.send(id, &shared) {
        debug!(conn_id = %id, %error, "send failed, closing connection");
        state.registry.close(id);
    }
}
