//! Expiring key-value cache
//!
//! Token allow-list entries and SMS codes live here. Production uses redis,
//! tests and single-node setups can use the in-process store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::config::RedisConfig;
use crate::error::AppResult;

/// Expiring key-value store
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Overwrite the value and its expiration
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Write only when the key is absent; returns whether the value was written
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Increment a counter, the expiration is set when the counter is created
    async fn incr(&self, key: &str, ttl: Duration) -> AppResult<i64>;
}

impl dyn CacheStore {
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set_ex(key, &raw, ttl).await
    }
}

/// Redis backed cache
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        info!("Connecting to redis: {}:{}/{}", config.host, config.port, config.database);
        let client = Client::open(config.connection_url())?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

/// Redis rejects a zero expiration
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> AppResult<i64> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(key, ttl_secs(ttl) as i64).await?;
        }
        Ok(count)
    }
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process cache with per-key expiration
#[derive(Clone, Default)]
pub struct MemoryCache {
    data: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.retain(|_, entry| !entry.is_expired());
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let expired = match self.data.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.data
            .insert(key.to_string(), MemoryEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(false);
                }
                occupied.insert(MemoryEntry::new(value.to_string(), ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry::new(value.to_string(), ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.data.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> AppResult<i64> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry::new("0".to_string(), ttl));
        if entry.is_expired() {
            *entry = MemoryEntry::new("0".to_string(), ttl);
        }
        let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        Ok(count)
    }
}
