// =============================================================================
// WebSocket Handler — recommendation push stream
// =============================================================================
//
// Clients connect to `/api/v1/ws?token=<token>` and receive:
//   1. The current recommendation on connect, if one has been published.
//   2. Every recommendation published afterwards, as soon as the watch
//      channel reports a change.
//
// Ping frames are answered with Pong; Close or a receive error ends the
// connection.  A slow client only ever sees the latest value since the watch
// channel keeps one slot.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::auth::validate_token;
use crate::engine::Engine;
use crate::recommendation::CurrentRecommendation;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Validates `?token=` before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<Engine>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let token = query.token.unwrap_or_default();
    if !validate_token(&token) {
        warn!("websocket connection rejected: invalid token");
        return (StatusCode::FORBIDDEN, "Invalid or missing token").into_response();
    }

    info!("websocket connection accepted");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, engine))
        .into_response()
}

async fn handle_ws_connection(socket: WebSocket, engine: Arc<Engine>) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = engine.subscribe();
    let mut sequence: u64 = 0;

    let initial = updates.borrow_and_update().clone();
    if let Some(rec) = initial {
        if let Err(e) = send_recommendation(&mut sender, &rec, &mut sequence).await {
            debug!(error = %e, "initial websocket push failed");
            return;
        }
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    info!("recommendation channel closed, ending websocket");
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(rec) = latest {
                    if let Err(e) = send_recommendation(&mut sender, &rec, &mut sequence).await {
                        debug!(error = %e, "websocket send failed, disconnecting");
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket receive error, disconnecting");
                        break;
                    }
                }
            }
        }
    }

    info!(sent = sequence, "websocket connection closed");
}

async fn send_recommendation<S>(
    sender: &mut S,
    rec: &CurrentRecommendation,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(rec) {
        Ok(json) => {
            sender.send(Message::Text(json)).await?;
            *sequence += 1;
            debug!(seq = *sequence, strategy = %rec.strategy_id, "recommendation pushed");
        }
        // not a network error; keep the connection
        Err(e) => warn!(error = %e, "failed to serialize recommendation"),
    }
    Ok(())
}
