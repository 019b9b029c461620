//! WebSocket upgrade endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;

use super::listener::MessageListeners;
use super::registry::{SessionRegistry, WebSocketSession};
use crate::auth::LoginUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /infra/ws?token=...
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let token = query.token.unwrap_or_default();
    let user = match state.auth.validate(&token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!("WebSocket handshake rejected: {}", e);
            return e.into_response();
        }
    };
    let heartbeat = Duration::from_secs(state.config.websocket.heartbeat_timeout_secs);
    let registry = state.ws.clone();
    let listeners = state.ws_listeners.clone();
    ws.on_upgrade(move |socket| serve_session(socket, user, registry, listeners, heartbeat))
}

async fn serve_session(
    socket: WebSocket,
    user: LoginUser,
    registry: Arc<SessionRegistry>,
    listeners: Arc<MessageListeners>,
    heartbeat: Duration,
) {
    let (sink, mut stream) = socket.split();
    let session = Arc::new(WebSocketSession::new(user, Box::new(sink)));
    registry.add(session.clone()).await;

    loop {
        // every inbound frame, of any kind, resets the read deadline
        let frame = match tokio::time::timeout(heartbeat, stream.next()).await {
            Err(_) => {
                tracing::debug!("Session {} missed its heartbeat", session.id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!("Session {} read failed: {}", session.id, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };
        session.touch();

        match frame {
            Message::Text(text) => {
                let text = text.trim();
                match text {
                    "" | "pong" => {}
                    "ping" => {
                        if let Err(e) = session.send_text("pong").await {
                            tracing::debug!("Session {} pong failed: {}", session.id, e);
                            break;
                        }
                    }
                    _ => {
                        listeners.dispatch(&session, text).await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.remove(&session.id).await;
    session.close().await;
}
