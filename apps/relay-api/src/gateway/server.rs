//! WebSocket upgrade handler and per-connection pump.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::error::ApiError;
use crate::AppState;

/// How long a single socket write may take before the connection is
/// considered dead. Bounds how long a slow client can stall its own
/// delivery; other users are never affected either way.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/startwebsocket", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)
        .or(params.token)
        .ok_or_else(|| ApiError::unauthorized("Missing connection token"))?;

    let user_id = state.auth.resolve(&token).await.map_err(|err| match err {
        AuthError::Rejected => ApiError::unauthorized("Invalid or expired token"),
        AuthError::Unavailable(reason) => {
            tracing::error!(%reason, "auth service lookup failed");
            ApiError::internal("Authorization unavailable")
        }
    })?;

    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, user_id)))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: Uuid) {
    let conn_id = ripple_common::id::prefixed_ulid(ripple_common::id::prefix::CONNECTION);

    let mut outbound = state.online.register(user_id);
    tracing::info!(%conn_id, %user_id, "websocket connected");

    // Subscribe into the broker of every chat the user belongs to that
    // is already active.
    if let Err(err) = state.registry.subscribe_user(user_id).await {
        tracing::error!(%conn_id, %user_id, %err, "subscription failed, closing connection");
        drop(outbound);
        state.online.unregister(&user_id);
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // A broker queued an envelope for this user.
            queued = outbound.recv() => {
                match queued {
                    Some(envelope) => {
                        if !write_envelope(&mut ws_tx, &conn_id, envelope).await {
                            break;
                        }
                    }
                    // Registry entry replaced by a newer connection.
                    None => break,
                }
            }

            // The client closed, errored, or sent us a frame.
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%conn_id, ?err, "ws read error");
                        break;
                    }
                    // Inbound frames carry nothing: delivery is one-way.
                    Some(Ok(_)) => continue,
                }
            }
        }
    }

    drop(outbound);
    state.online.unregister(&user_id);
    tracing::info!(%conn_id, %user_id, "websocket disconnected");
}

/// Write one envelope to the socket within the deadline. Returns `false`
/// when the connection should be torn down.
async fn write_envelope(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    conn_id: &str,
    envelope: ripple_common::Envelope,
) -> bool {
    let json = serde_json::to_string(&envelope).unwrap();
    match time::timeout(WRITE_DEADLINE, ws_tx.send(Message::Text(json.into()))).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::debug!(%conn_id, ?err, "ws write error");
            false
        }
        Err(_) => {
            tracing::warn!(%conn_id, "ws write deadline exceeded");
            false
        }
    }
}
