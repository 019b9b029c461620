//! Asynchronous login log writer
//!
//! Entries are queued on a bounded channel and persisted by a background task,
//! so a slow database never delays a login.

use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tokio::sync::mpsc;

use crate::entity::login_log::{self, LoginLogType, LoginResult};

/// Log entry to be persisted
#[derive(Debug, Clone)]
pub struct LoginLogEntry {
    pub tenant_id: i64,
    pub log_type: LoginLogType,
    pub user_id: Option<i64>,
    pub user_type: i32,
    pub username: String,
    pub result: LoginResult,
    pub user_ip: String,
    pub user_agent: String,
}

#[derive(Clone)]
pub struct LoginLogWriter {
    tx: mpsc::Sender<LoginLogEntry>,
}

impl LoginLogWriter {
    /// Spawn the background writer
    pub fn spawn(db: DatabaseConnection) -> Self {
        let (tx, mut rx) = mpsc::channel::<LoginLogEntry>(200);

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let log = login_log::ActiveModel {
                    tenant_id: Set(entry.tenant_id),
                    log_type: Set(entry.log_type as i32),
                    user_id: Set(entry.user_id),
                    user_type: Set(entry.user_type),
                    username: Set(entry.username),
                    result: Set(entry.result as i32),
                    user_ip: Set(entry.user_ip),
                    user_agent: Set(entry.user_agent),
                    create_time: Set(crate::entity::now()),
                    ..Default::default()
                };

                if let Err(e) = log.insert(&db).await {
                    tracing::error!("Failed to write login log: {}", e);
                }
            }
            tracing::debug!("Login log writer stopped");
        });

        Self { tx }
    }

    /// Queue an entry; dropped with a warning when the queue is full
    pub fn record(&self, entry: LoginLogEntry) {
        if let Err(e) = self.tx.try_send(entry) {
            tracing::warn!("Login log channel unavailable, log dropped: {}", e);
        }
    }
}
