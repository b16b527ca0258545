//! GET /ws: push channel.
//!
//! Each connection becomes one event-hub subscriber for its lifetime. The
//! server sends every `BroadcastEvent` as a JSON text frame; anything the
//! client sends is ignored apart from close.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};

use crate::events::EventHub;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.events.clone();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

async fn forward_events(socket: WebSocket, events: EventHub) {
    let mut subscription = events.subscribe();
    let id = subscription.id();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    // Hub closed: server is shutting down
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(event.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode {} event: {}", event.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text.into())).await {
                    tracing::debug!(subscriber = id, "Send failed: {}", e);
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
