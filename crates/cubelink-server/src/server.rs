//! WebSocket connection handling

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

/// Handle WebSocket upgrade
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one WebSocket peer
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("peer connected");
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the welcome so no broadcast frame is missed.
    let mut outbound_rx = state.outbound_tx.subscribe();

    // Fixed welcome frame for every new peer.
    if sender
        .send(Message::Text(state.welcome.clone()))
        .await
        .is_err()
    {
        return;
    }

    // Forward bridge output to this peer.
    let mut send_task = tokio::spawn(async move {
        while let Ok(text) = outbound_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Route inbound frames into the bridge.
    let bridge = state.bridge.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = bridge.inbound_text(text).await {
                        warn!("failed to route inbound frame: {}", e);
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either direction to finish, then tear the other down.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // A closed connection is observed only; there is no reconnect logic.
    info!("peer disconnected");
}
