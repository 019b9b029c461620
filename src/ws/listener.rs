//! Inbound message dispatch
//!
//! Text frames from clients are parsed as [`WsMessage`] and routed by `type`
//! to the listener registered for it. Unknown types are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::registry::{SessionRegistry, WebSocketSession, WsMessage};

/// Handles one inbound message type
#[async_trait]
pub trait MessageListener: Send + Sync {
    fn message_type(&self) -> &str;

    async fn on_message(&self, session: &WebSocketSession, content: serde_json::Value);
}

/// Listeners keyed by message type
#[derive(Default, Clone)]
pub struct MessageListeners {
    listeners: HashMap<String, Arc<dyn MessageListener>>,
}

impl MessageListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listeners bundled with the server
    pub fn with_defaults(registry: Arc<SessionRegistry>) -> Self {
        let mut listeners = Self::new();
        listeners.register(Arc::new(MessageSendListener { registry }));
        listeners
    }

    pub fn register(&mut self, listener: Arc<dyn MessageListener>) {
        self.listeners
            .insert(listener.message_type().to_string(), listener);
    }

    /// Route a raw text frame; returns false when nothing handled it
    pub async fn dispatch(&self, session: &WebSocketSession, text: &str) -> bool {
        let message: WsMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Ignoring malformed frame from session {}: {}", session.id, e);
                return false;
            }
        };
        let Some(listener) = self.listeners.get(&message.message_type) else {
            tracing::debug!(
                "No listener for message type {} (session {})",
                message.message_type,
                session.id
            );
            return false;
        };
        listener.on_message(session, message.content).await;
        true
    }
}

pub const MESSAGE_SEND: &str = "message-send";
pub const MESSAGE_RECEIVE: &str = "message-receive";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSend {
    #[serde(default)]
    to_user_id: Option<i64>,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageReceive {
    from_user_id: i64,
    text: String,
    single: bool,
}

/// Relays chat text to one user, or to every session of the sender's tenant
/// when no target is given
pub struct MessageSendListener {
    registry: Arc<SessionRegistry>,
}

#[async_trait]
impl MessageListener for MessageSendListener {
    fn message_type(&self) -> &str {
        MESSAGE_SEND
    }

    async fn on_message(&self, session: &WebSocketSession, content: serde_json::Value) {
        let send: MessageSend = match serde_json::from_value(content) {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!("Bad {} payload from session {}: {}", MESSAGE_SEND, session.id, e);
                return;
            }
        };
        let receive = MessageReceive {
            from_user_id: session.user.user_id,
            text: send.text,
            single: send.to_user_id.is_some(),
        };
        let Ok(message) = WsMessage::new(MESSAGE_RECEIVE, &receive) else {
            return;
        };
        let text = message.to_text();
        let tenant_id = session.user.tenant_id;
        match send.to_user_id {
            Some(to) => {
                self.registry.send_in_tenant(tenant_id, to, &text).await;
            }
            None => {
                self.registry.broadcast_in_tenant(tenant_id, &text).await;
            }
        }
    }
}
