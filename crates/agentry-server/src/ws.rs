//! WebSocket edge: a client sends `join:session <uuid>` once to subscribe,
//! then receives every C7 event for that session as a JSON text frame.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let session_id = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match parse_join(&text) {
                Some(id) => break id,
                None => {
                    let _ = socket
                        .send(Message::Text(
                            json!({"error": "expected 'join:session <uuid>'"}).to_string().into(),
                        ))
                        .await;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Err(_)) => return,
            _ => continue,
        }
    };

    let mut receiver = state.events.subscribe(session_id);
    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event).unwrap_or_default();
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => continue,
                }
            }
        }
    }
}

fn parse_join(text: &str) -> Option<Uuid> {
    let rest = text.trim().strip_prefix("join:session")?;
    Uuid::parse_str(rest.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_join_message() {
        let id = Uuid::new_v4();
        let parsed = parse_join(&format!("join:session {id}")).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_messages_without_the_join_prefix() {
        assert!(parse_join("hello").is_none());
    }
}
