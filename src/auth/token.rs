//! Token allow-list
//!
//! Every minted token pair is recorded in the cache under
//! `oauth2_access_token:<token>` for both the access and the refresh token.
//! A token is only accepted while its entry exists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{JwtManager, LoginUser, UserType};
use crate::cache::CacheStore;
use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};

pub const ACCESS_TOKEN_KEY_PREFIX: &str = "oauth2_access_token:";

pub fn access_token_key(token: &str) -> String {
    format!("{}{}", ACCESS_TOKEN_KEY_PREFIX, token)
}

/// Cached token record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: i64,
    pub user_type: UserType,
    pub tenant_id: i64,
    pub user_info: BTreeMap<String, String>,
    /// Access token expiration, unix millis
    pub expires_time: i64,
    /// Refresh token expiration, unix millis
    pub refresh_expires_time: i64,
}

impl AccessTokenRecord {
    fn matches(&self, user: &LoginUser) -> bool {
        self.user_id == user.user_id
            && self.user_type == user.user_type
            && self.tenant_id == user.tenant_id
    }
}

/// Tokens handed back to the client after login or refresh
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiration, unix millis
    pub expires_time: i64,
}

pub struct TokenService {
    jwt: JwtManager,
    cache: Arc<dyn CacheStore>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            jwt: JwtManager::new(config),
            cache,
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    /// Mint an access/refresh pair and register both in the allow-list
    pub async fn create_token(&self, user: &LoginUser) -> AppResult<TokenBundle> {
        let (access_token, access_claims) = self.jwt.sign(user, self.access_ttl_secs)?;
        let (refresh_token, refresh_claims) = self.jwt.sign(user, self.refresh_ttl_secs)?;

        let mut user_info = BTreeMap::new();
        user_info.insert("nickname".to_string(), user.nickname.clone());

        let record = AccessTokenRecord {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            user_id: user.user_id,
            user_type: user.user_type,
            tenant_id: user.tenant_id,
            user_info,
            expires_time: access_claims.exp * 1000,
            refresh_expires_time: refresh_claims.exp * 1000,
        };

        self.cache
            .set_json(
                &access_token_key(&access_token),
                &record,
                ttl_until(access_claims.exp),
            )
            .await?;
        self.cache
            .set_json(
                &access_token_key(&refresh_token),
                &record,
                ttl_until(refresh_claims.exp),
            )
            .await?;

        Ok(TokenBundle {
            user_id: user.user_id,
            access_token,
            refresh_token,
            expires_time: record.expires_time,
        })
    }

    /// Resolve the identity behind an access token
    pub async fn validate(&self, token: &str) -> AppResult<LoginUser> {
        let claims = self.jwt.verify(token)?;
        let user = claims.login_user()?;

        let record: Option<AccessTokenRecord> =
            self.cache.get_json(&access_token_key(token)).await?;
        match record {
            Some(record) if record.access_token == token && record.matches(&user) => Ok(user),
            Some(_) => {
                tracing::warn!("Token record does not match claims of user {}", user.user_id);
                Err(AppError::unauthorized())
            }
            None => Err(AppError::unauthorized()),
        }
    }

    /// Look up the record of a refresh token; the caller mints the new pair
    pub async fn check_refresh_token(&self, refresh_token: &str) -> AppResult<AccessTokenRecord> {
        let invalid = || AppError::Unauthorized("无效的刷新令牌".to_string());

        let claims = self.jwt.verify(refresh_token).map_err(|_| invalid())?;
        let record: AccessTokenRecord = self
            .cache
            .get_json(&access_token_key(refresh_token))
            .await?
            .ok_or_else(invalid)?;
        if record.refresh_token != refresh_token || record.user_id != claims.user_id {
            return Err(invalid());
        }
        Ok(record)
    }

    /// Remove both entries of the pair the access token belongs to
    pub async fn remove_access_token(&self, token: &str) -> AppResult<Option<AccessTokenRecord>> {
        let key = access_token_key(token);
        let record: Option<AccessTokenRecord> = self.cache.get_json(&key).await?;
        let Some(record) = record else {
            return Ok(None);
        };
        if record.access_token != token {
            return Ok(None);
        }
        self.cache.delete(&key).await?;
        self.cache
            .delete(&access_token_key(&record.refresh_token))
            .await?;
        Ok(Some(record))
    }
}

fn ttl_until(exp: i64) -> Duration {
    let remaining = exp - chrono::Utc::now().timestamp();
    Duration::from_secs(remaining.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn service() -> (TokenService, MemoryCache) {
        let cache = MemoryCache::new();
        let config = JwtConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            ..JwtConfig::default()
        };
        (TokenService::new(&config, Arc::new(cache.clone())), cache)
    }

    fn user() -> LoginUser {
        LoginUser {
            user_id: 42,
            user_type: UserType::Admin,
            tenant_id: 1,
            nickname: "admin".to_string(),
        }
    }

    #[tokio::test]
    async fn test_validate_roundtrip() {
        let (tokens, cache) = service();
        let bundle = tokens.create_token(&user()).await.unwrap();
        assert_eq!(bundle.user_id, 42);
        assert_eq!(cache.len(), 2);

        let identity = tokens.validate(&bundle.access_token).await.unwrap();
        assert_eq!(identity, user());
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (tokens, _) = service();
        let bundle = tokens.create_token(&user()).await.unwrap();
        assert!(tokens.validate(&bundle.refresh_token).await.is_err());

        let record = tokens
            .check_refresh_token(&bundle.refresh_token)
            .await
            .unwrap();
        assert_eq!(record.access_token, bundle.access_token);
        assert!(tokens.check_refresh_token(&bundle.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_logout_revokes_pair() {
        let (tokens, cache) = service();
        let bundle = tokens.create_token(&user()).await.unwrap();

        let removed = tokens
            .remove_access_token(&bundle.access_token)
            .await
            .unwrap();
        assert!(removed.is_some());
        assert!(cache.is_empty());
        assert!(matches!(
            tokens.validate(&bundle.access_token).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(tokens.check_refresh_token(&bundle.refresh_token).await.is_err());

        // second logout is a no-op
        assert!(tokens
            .remove_access_token(&bundle.access_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_tampered_record_rejected() {
        let (tokens, cache) = service();
        let bundle = tokens.create_token(&user()).await.unwrap();
        let key = access_token_key(&bundle.access_token);

        let raw = cache.get(&key).await.unwrap().unwrap();
        let mut record: AccessTokenRecord = serde_json::from_str(&raw).unwrap();
        record.tenant_id = 99;
        cache
            .set_ex(&key, &serde_json::to_string(&record).unwrap(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(tokens.validate(&bundle.access_token).await.is_err());
    }
}
