//! The hub's WebSocket transport (C6): `verifyClient`-equivalent admission
//! checks ahead of the upgrade, then a per-connection read/write pump.
//!
//! A long-lived, registered connection whose reads are dispatched through
//! [`crate::router::handle_frame`], rather than a single-shot request/
//! response exchange.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use futures::{FutureExt, SinkExt, StreamExt};
use serde::Deserialize;

use crate::HubState;
use crate::connection::KickReason;
use crate::memory::MemoryPressure;

/// Deprecated query-string fallback for bearer auth.
#[derive(Debug, Deserialize, Default)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// The `verifyClient`-equivalent admission check, then the upgrade itself.
pub async fn upgrade(
    State(state): State<HubState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.connections.is_draining() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if state.memory.current_pressure() == MemoryPressure::Critical {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if state.connections.connection_count() >= state.config.max_connections {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if let Some(expected) = &state.config.auth_token {
        let provided = auth_header
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
            .or(query.token);
        if provided.as_deref() != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|err| {
            tracing::warn!(error = %err, "failed to upgrade websocket connection");
        })
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drives one accepted connection: a writer task draining the connection's
/// outbound queue to the socket, and a read loop dispatching every inbound
/// text frame through [`crate::router::handle_frame`].
///
/// That call is wrapped in [`std::panic::AssertUnwindSafe`] + `catch_unwind`
/// (via `futures::FutureExt`) so a panic inside one connection's frame
/// handling can never bring down the rest of the hub — the "immortality"
/// invariant `router::handle_frame`'s own doc comment calls out.
async fn handle_socket(socket: WebSocket, state: HubState) {
    let (conn_id, mut outbound_rx) = state.connections.accept();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let encoded = match serde_json::to_string(&message) {
                Ok(encoded) => encoded,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(encoded.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
    });

    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let raw = text.into_bytes();
                if std::panic::AssertUnwindSafe(crate::router::handle_frame(&state, conn_id, &raw))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!(connection = %conn_id, "panic while handling an inbound frame");
                }
            }
            Some(Ok(WsMessage::Binary(raw))) => {
                if std::panic::AssertUnwindSafe(crate::router::handle_frame(&state, conn_id, &raw))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!(connection = %conn_id, "panic while handling an inbound frame");
                }
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_other)) => continue,
            Some(Err(err)) => {
                tracing::warn!(connection = %conn_id, error = %err, "websocket transport error");
                break;
            }
        }
    }

    writer.abort();
    state.connections.kick(conn_id, KickReason::Disconnected);
}
