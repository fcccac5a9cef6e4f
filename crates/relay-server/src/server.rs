//! `GatewayServer` — Axum HTTP + WebSocket server.
//!
//! Per-connection pipeline, in order and with no state touched before its
//! stage: authenticate the handshake credential, run the admission check,
//! join the operator's channel (evicting any previous connection), then
//! stream events and heartbeats until disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use relay_registry::SessionRegistry;
use relay_settings::ServerSettings;
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthError, CredentialVerifier};
use crate::gate::ConnectionGate;
use crate::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::hub::{ConnectionHub, OperatorConnection};
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_REJECTS_TOTAL,
};
use crate::shutdown::ShutdownCoordinator;
use crate::wire::{CloseReason, WireEvent};

/// Per-connection outbound queue depth.
const SEND_BUFFER: usize = 256;

/// Server network and heartbeat configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Interval between server-initiated pings.
    pub heartbeat_interval: Duration,
    /// Silence window after which a client is disconnected.
    pub heartbeat_timeout: Duration,
}

impl ServerConfig {
    /// Build from settings.
    #[must_use]
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Active-connection registry and fan-out.
    pub hub: Arc<ConnectionHub>,
    /// Admission limiter.
    pub gate: Arc<ConnectionGate>,
    /// Handshake credential verifier.
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Session registry (for health reporting).
    pub registry: Arc<SessionRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
}

/// The gateway's HTTP + WebSocket server.
pub struct GatewayServer {
    state: AppState,
}

impl GatewayServer {
    /// Assemble the server from its collaborators.
    pub fn new(
        config: ServerConfig,
        hub: Arc<ConnectionHub>,
        gate: Arc<ConnectionGate>,
        verifier: Arc<dyn CredentialVerifier>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            state: AppState {
                hub,
                gate,
                verifier,
                registry,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                config,
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current operator connection count.
    pub connections: usize,
    /// Number of live bot sessions.
    pub active_sessions: usize,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.hub.connection_count().await,
        active_sessions: state.registry.active_count(),
    })
}

/// GET /ws — WebSocket upgrade.
///
/// The credential travels in the `Authorization: Bearer` header or, for
/// browser clients that cannot set headers on a WebSocket handshake, the
/// `token` query parameter. The header wins when both are present.
async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let token = bearer_token(&headers).or_else(|| query.get("token").cloned());
    ws.on_upgrade(move |socket| run_ws_session(socket, state, token))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn authenticate(
    verifier: &dyn CredentialVerifier,
    token: Option<&str>,
) -> Result<relay_core::OperatorId, AuthError> {
    verifier.verify(token.ok_or(AuthError::Missing)?)
}

/// Whether a text frame is a client-level ping (`{"type":"ping"}`).
fn is_client_ping(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("type").and_then(|t| t.as_str().map(str::to_owned)))
        .is_some_and(|kind| kind == "ping")
}

async fn close_with(mut socket: WebSocket, reason: &CloseReason) {
    let frame = CloseFrame {
        code: reason.code(),
        reason: reason.reason().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Run one WebSocket session from upgrade through disconnect.
#[instrument(skip_all)]
async fn run_ws_session(socket: WebSocket, state: AppState, token: Option<String>) {
    // AUTHENTICATING — before any registry or hub mutation.
    let operator_id = match authenticate(state.verifier.as_ref(), token.as_deref()) {
        Ok(operator_id) => operator_id,
        Err(e) => {
            counter!(WS_REJECTS_TOTAL, "reason" => "auth").increment(1);
            debug!(error = %e, "handshake credential rejected");
            close_with(socket, &CloseReason::AuthFailed).await;
            return;
        }
    };

    // ADMISSION_CHECK — strictly after auth, scoped per identity.
    if let Err(e) = state.gate.check(&operator_id) {
        counter!(WS_REJECTS_TOTAL, "reason" => "admission").increment(1);
        info!(operator_id = %operator_id, error = %e, "connection rejected by admission control");
        close_with(
            socket,
            &CloseReason::RateLimited {
                retry_after_secs: e.retry_after_secs(),
            },
        )
        .await;
        return;
    }

    // JOINED — evict-then-register before any event delivery.
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_BUFFER);
    let connection = Arc::new(OperatorConnection::new(operator_id.clone(), send_tx));
    let connection_id = connection.id.clone();
    let _evicted = state.hub.register(connection.clone()).await;

    info!(operator_id = %operator_id, connection_id = %connection_id, "operator connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let established = WireEvent::connection_established(&connection_id);
    let _ = ws_tx.send(Message::Text(established.to_json().into())).await;

    // Heartbeat watchdog: cancels the connection when the client goes silent.
    let watchdog = {
        let conn = connection.clone();
        let cancel = connection.cancel_token();
        let interval = state.config.heartbeat_interval;
        let timeout = state.config.heartbeat_timeout;
        tokio::spawn(async move {
            if run_heartbeat(conn.clone(), interval, timeout, cancel).await
                == HeartbeatResult::TimedOut
            {
                warn!(connection_id = %conn.id, "client unresponsive, disconnecting");
                conn.close_with(CloseReason::Unresponsive);
            }
        })
    };

    // Outbound: queued events plus periodic Ping frames; a cancelled
    // connection gets a close frame with its recorded reason.
    let outbound = {
        let conn = connection.clone();
        let cancel = connection.cancel_token();
        let ping_interval = state.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ping = tokio::time::interval(ping_interval);
            let _ = ping.tick().await;
            loop {
                tokio::select! {
                    queued = send_rx.recv() => match queued {
                        Some(text) => {
                            if ws_tx
                                .send(Message::Text(text.as_str().to_owned().into()))
                                .await
                                .is_err()
                            {
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
                    () = cancel.cancelled() => {
                        let reason = conn.close_reason().unwrap_or(CloseReason::Superseded);
                        let frame = CloseFrame {
                            code: reason.code(),
                            reason: reason.reason().into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        })
    };

    // ACTIVE — inbound loop.
    let read_cancel = connection.cancel_token();
    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(message)) => match message {
                    Message::Text(text) => {
                        connection.mark_alive();
                        if is_client_ping(&text) {
                            let _ = connection.send_event(&WireEvent::pong());
                        }
                    }
                    Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
                    Message::Close(_) => {
                        debug!(connection_id = %connection_id, "client sent close frame");
                        break;
                    }
                    Message::Binary(_) => {}
                },
                Some(Err(_)) | None => break,
            },
            () = read_cancel.cancelled() => break,
        }
    }

    // CLOSED — guarded removal: only the currently-registered connection may
    // vacate the operator's slot.
    let removed = state.hub.unregister(&connection).await;
    watchdog.abort();
    connection.close();
    outbound.abort();

    info!(
        operator_id = %operator_id,
        connection_id = %connection_id,
        removed_registration = removed,
        "operator disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}
