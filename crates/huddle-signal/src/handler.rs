//! Signaling WebSocket handler.
//!
//! Each connection gets two halves:
//!
//! 1. A writer task that owns the socket sink, drains the connection's
//!    [`Outbox`] and sends a ping every heartbeat interval.
//! 2. A receive loop that parses text frames into [`ClientEvent`]s and hands
//!    them to the [`SignalHub`]. Failures go back to the client as `error`
//!    events; the connection stays open.
//!
//! When the transport closes, errors, or stays silent past the idle timeout,
//! the connection is removed from its room before the writer is stopped.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;

use crate::connection::{ConnectionId, ConnectionState};
use crate::error::SignalError;
use crate::hub::SignalHub;
use crate::protocol::{ClientEvent, ServerEvent, Welcome};

const MIN_TICK: Duration = Duration::from_secs(1);

/// Build the signaling WebSocket router.
pub fn build_router(hub: SignalHub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(hub)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<SignalHub>) -> Response {
    let max_frame = hub.settings().max_frame_bytes;
    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| handle_connection(socket, hub))
}

/// Handle a single signaling WebSocket connection.
async fn handle_connection(socket: WebSocket, hub: SignalHub) {
    let (mut sender, mut receiver) = socket.split();

    let connection = ConnectionId::new();
    let (outbox, mut outbox_rx) = hub.open_outbox(connection);
    let heartbeat = hub.settings().heartbeat_interval.max(MIN_TICK);
    let idle_timeout = hub.settings().idle_timeout.max(MIN_TICK);

    tracing::info!(connection = %connection, "Signaling client connected");
    outbox.deliver(ServerEvent::Connected(Welcome {
        socket_id: connection,
    }));

    // ── Writer task ──────────────────────────────────────────────────────────
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                event = outbox_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(connection = %connection, event = event.name(), error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // ── Receive loop ─────────────────────────────────────────────────────────
    let mut state = ConnectionState::Connected;

    loop {
        let frame = tokio::select! {
            _ = &mut send_task => break,
            frame = tokio::time::timeout(idle_timeout, receiver.next()) => frame,
        };

        let msg = match frame {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection = %connection, error = %e, "WebSocket receive error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(connection = %connection, timeout = ?idle_timeout, "Signaling client idle, closing");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let result = match ClientEvent::parse(text.as_str()) {
                    Ok(event) => hub.dispatch(&outbox, event).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(next) if next != state => {
                        tracing::debug!(connection = %connection, from = ?state, to = ?next, "Connection state changed");
                        state = next;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(connection = %connection, code = e.code(), error = %e, "Rejected client event");
                        outbox.deliver(e.to_event());
                    }
                }
            }
            Message::Binary(_) => {
                outbox.deliver(SignalError::UnsupportedFrame.to_event());
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    hub.disconnect(connection).await;
    tracing::debug!(connection = %connection, from = ?state, to = ?ConnectionState::Disconnected, "Connection state changed");

    send_task.abort();
    tracing::info!(connection = %connection, "Signaling client disconnected");
}
