use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::models::events::{ErrorEvent, ServerEvent};
use crate::registry::SessionHandle;
use crate::relay::dispatch::{handle_client_message, parse_client_message};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let SessionHandle { id: session_id, events } = state.registry.connect();

    info!(session_id = %session_id, "websocket session connected");

    let mut outbound = ReceiverStream::new(events);
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let relay = state.relay.clone();
    let registry = state.registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let replies = match parse_client_message(&text) {
                Ok(message) => handle_client_message(&relay, session_id, message).await,
                Err(err) => vec![ServerEvent::Error(ErrorEvent::from(&err))],
            };

            for reply in replies {
                registry.send_to(session_id, reply);
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.relay.disconnect(session_id);
    info!(session_id = %session_id, "websocket session disconnected");
}
