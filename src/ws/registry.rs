//! WebSocket session registry
//!
//! Sessions are kept in a single map behind a read-write lock. Delivery takes
//! a snapshot of the matching sessions, releases the lock, then writes; a
//! session whose write fails is removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::SplitSink;
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::{LoginUser, UserType};

/// Outbound half of a connection
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_text(&mut self, text: String) -> anyhow::Result<()>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
impl FrameWriter for SplitSink<WebSocket, Message> {
    async fn write_text(&mut self, text: String) -> anyhow::Result<()> {
        self.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        SinkExt::close(self).await?;
        Ok(())
    }
}

/// JSON frame exchanged with clients
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl WsMessage {
    pub fn new(message_type: impl Into<String>, content: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            message_type: message_type.into(),
            content: serde_json::to_value(content)?,
        })
    }

    pub fn to_text(&self) -> String {
        // a Value-backed struct always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One authenticated connection
pub struct WebSocketSession {
    pub id: String,
    pub user: LoginUser,
    pub created_at: DateTime<Utc>,
    /// Unix millis of the last inbound frame
    last_seen: AtomicI64,
    writer: Mutex<Box<dyn FrameWriter>>,
}

impl WebSocketSession {
    pub fn new(user: LoginUser, writer: Box<dyn FrameWriter>) -> Self {
        let created_at = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            created_at,
            last_seen: AtomicI64::new(created_at.timestamp_millis()),
            writer: Mutex::new(writer),
        }
    }

    /// Record inbound activity
    pub fn touch(&self) {
        self.last_seen
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_seen.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    /// Frames written through one session keep their call order
    pub async fn send_text(&self, text: &str) -> anyhow::Result<()> {
        self.writer.lock().await.write_text(text.to_string()).await
    }

    pub async fn close(&self) {
        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Closing session {} failed: {}", self.id, e);
        }
    }
}

/// All live sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<WebSocketSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, session: Arc<WebSocketSession>) {
        info!(
            "WebSocket session opened: {} (user {}, type {:?})",
            session.id, session.user.user_id, session.user.user_type
        );
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<WebSocketSession>> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            info!("WebSocket session closed: {}", session_id);
        }
        removed
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<WebSocketSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write to every session of the user; returns the number of deliveries
    pub async fn send(&self, user_id: i64, text: &str) -> usize {
        self.deliver(text, |s| s.user.user_id == user_id).await
    }

    /// Write to every session
    pub async fn broadcast(&self, text: &str) -> usize {
        self.deliver(text, |_| true).await
    }

    pub async fn broadcast_by_user_type(&self, user_type: UserType, text: &str) -> usize {
        self.deliver(text, |s| s.user.user_type == user_type).await
    }

    /// Like [`Self::send`], restricted to sessions of one tenant
    pub async fn send_in_tenant(&self, tenant_id: i64, user_id: i64, text: &str) -> usize {
        self.deliver(text, |s| s.user.tenant_id == tenant_id && s.user.user_id == user_id)
            .await
    }

    pub async fn broadcast_in_tenant(&self, tenant_id: i64, text: &str) -> usize {
        self.deliver(text, |s| s.user.tenant_id == tenant_id).await
    }

    pub async fn broadcast_in_tenant_by_user_type(
        &self,
        tenant_id: i64,
        user_type: UserType,
        text: &str,
    ) -> usize {
        self.deliver(text, |s| {
            s.user.tenant_id == tenant_id && s.user.user_type == user_type
        })
        .await
    }

    /// Typed helper over [`Self::send`]
    pub async fn send_message(&self, user_id: i64, message: &WsMessage) -> usize {
        self.send(user_id, &message.to_text()).await
    }

    async fn deliver<F>(&self, text: &str, filter: F) -> usize
    where
        F: Fn(&WebSocketSession) -> bool,
    {
        let targets: Vec<Arc<WebSocketSession>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| filter(s))
            .cloned()
            .collect();

        let results = join_all(targets.iter().map(|s| s.send_text(text))).await;
        let mut delivered = 0;
        for (session, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Write to session {} failed, dropping it: {}", session.id, e);
                    self.remove(&session.id).await;
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Frame writer backed by a channel
    pub(crate) struct ChannelWriter {
        tx: mpsc::UnboundedSender<String>,
        fail: bool,
    }

    #[async_trait]
    impl FrameWriter for ChannelWriter {
        async fn write_text(&mut self, text: String) -> anyhow::Result<()> {
            anyhow::ensure!(!self.fail, "connection reset");
            self.tx.send(text)?;
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn session(
        user_id: i64,
        user_type: UserType,
        fail: bool,
    ) -> (Arc<WebSocketSession>, mpsc::UnboundedReceiver<String>) {
        session_in(1, user_id, user_type, fail)
    }

    pub(crate) fn session_in(
        tenant_id: i64,
        user_id: i64,
        user_type: UserType,
        fail: bool,
    ) -> (Arc<WebSocketSession>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let user = LoginUser {
            user_id,
            user_type,
            tenant_id,
            nickname: format!("user{}", user_id),
        };
        let session = WebSocketSession::new(user, Box::new(ChannelWriter { tx, fail }));
        (Arc::new(session), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(text);
        }
        out
    }

    #[tokio::test]
    async fn test_send_reaches_every_session_of_user() {
        let registry = SessionRegistry::new();
        let (a1, mut rx_a1) = session(1, UserType::Admin, false);
        let (a2, mut rx_a2) = session(1, UserType::Admin, false);
        let (b, mut rx_b) = session(2, UserType::Admin, false);
        for s in [a1, a2, b] {
            registry.add(s).await;
        }

        assert_eq!(registry.send(1, "hello").await, 2);
        assert_eq!(drain(&mut rx_a1), vec!["hello"]);
        assert_eq!(drain(&mut rx_a2), vec!["hello"]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_by_user_type() {
        let registry = SessionRegistry::new();
        let (admin, mut rx_admin) = session(1, UserType::Admin, false);
        let (member, mut rx_member) = session(2, UserType::Member, false);
        registry.add(admin).await;
        registry.add(member).await;

        assert_eq!(registry.broadcast_by_user_type(UserType::Member, "m").await, 1);
        assert_eq!(registry.broadcast("all").await, 2);
        assert_eq!(drain(&mut rx_admin), vec!["all"]);
        assert_eq!(drain(&mut rx_member), vec!["m", "all"]);
    }

    #[tokio::test]
    async fn test_failed_session_removed_others_unaffected() {
        let registry = SessionRegistry::new();
        let (good, mut rx_good) = session(1, UserType::Admin, false);
        let (bad, _rx_bad) = session(2, UserType::Admin, true);
        let bad_id = bad.id.clone();
        registry.add(good).await;
        registry.add(bad).await;

        assert_eq!(registry.broadcast("x").await, 1);
        assert_eq!(drain(&mut rx_good), vec!["x"]);
        assert!(registry.get(&bad_id).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_order_within_session_and_late_joiners() {
        let registry = SessionRegistry::new();
        let (early, mut rx_early) = session(1, UserType::Admin, false);
        registry.add(early).await;
        for i in 0..20 {
            registry.send(1, &i.to_string()).await;
        }
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(drain(&mut rx_early), expected);

        registry.broadcast("before").await;
        let (late, mut rx_late) = session(2, UserType::Admin, false);
        registry.add(late).await;
        assert!(drain(&mut rx_late).is_empty());
    }

    #[tokio::test]
    async fn test_tenant_delivery_stays_in_tenant() {
        let registry = SessionRegistry::new();
        let (own, mut rx_own) = session_in(1, 2, UserType::Admin, false);
        let (foreign, mut rx_foreign) = session_in(2, 2, UserType::Admin, false);
        let (member, mut rx_member) = session_in(1, 3, UserType::Member, false);
        for s in [own, foreign, member] {
            registry.add(s).await;
        }

        assert_eq!(registry.send_in_tenant(1, 2, "dm").await, 1);
        assert_eq!(registry.broadcast_in_tenant(1, "all").await, 2);
        assert_eq!(
            registry
                .broadcast_in_tenant_by_user_type(1, UserType::Admin, "admins")
                .await,
            1
        );
        assert_eq!(drain(&mut rx_own), vec!["dm", "all", "admins"]);
        assert_eq!(drain(&mut rx_member), vec!["all"]);
        assert!(drain(&mut rx_foreign).is_empty());
    }

    #[tokio::test]
    async fn test_touch_advances_last_seen() {
        let (s, _rx) = session(1, UserType::Admin, false);
        assert!(s.last_seen() <= s.created_at);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        s.touch();
        assert!(s.last_seen() > s.created_at);
    }

    #[test]
    fn test_message_format() {
        let message = WsMessage::new("notice-push", serde_json::json!({"title": "t"})).unwrap();
        let text = message.to_text();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["type"], "notice-push");
        assert_eq!(parsed["content"]["title"], "t");
    }
}
