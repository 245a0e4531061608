//! WebSocket upgrade (spec §4.8 Notifications): every connected peer
//! receives `{response:"NOTIFY", node, args}` for each node `send-response`
//! event, for as long as the connection stays open.
//!
//! The teacher's own `orchestrator::api::ws::handler::ws_handler` never
//! performs a real upgrade — it just returns a JSON placeholder — so this
//! is a from-scratch implementation against `axum::extract::ws`, the same
//! extractor the teacher's dependency tree already carries (`axum` with
//! the `ws` feature) but never exercises.

use crate::protocol::NotifyMessage;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut notifications = state.notify.subscribe();
    loop {
        tokio::select! {
            notification = notifications.recv() => {
                match notification {
                    Ok((node, args)) => {
                        let message = NotifyMessage::new(node, args);
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "control websocket peer lagged behind notify broadcast");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
