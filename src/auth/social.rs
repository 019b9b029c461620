//! Social login: OAuth2 code exchange and binding of social accounts to local users

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde_json::Value;

use crate::config::{SocialConfig, SocialProviderConfig};
use crate::entity::{now, social_user, social_user_bind};
use crate::error::{AppError, AppResult};

/// Account data returned by a social platform
#[derive(Clone, Debug, Default)]
pub struct SocialUserInfo {
    pub openid: String,
    pub token: Option<String>,
    pub nickname: String,
    pub avatar: String,
    pub raw_token_info: Option<String>,
    pub raw_user_info: Option<String>,
}

/// A social platform client
#[async_trait]
pub trait SocialClient: Send + Sync {
    /// URL the browser is sent to for authorization
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> AppResult<String>;

    /// Exchange an authorization code for the account behind it
    async fn exchange(&self, code: &str, state: &str) -> anyhow::Result<SocialUserInfo>;
}

/// Generic OAuth2 authorization-code client
pub struct OAuth2Client {
    config: SocialProviderConfig,
    http: reqwest::Client,
}

impl OAuth2Client {
    pub fn new(config: SocialProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

/// Read a field that may be a string or a number
fn field_string(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SocialClient for OAuth2Client {
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> AppResult<String> {
        let url = reqwest::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::param(format!("无效的授权地址: {}", e)))?;
        Ok(url.to_string())
    }

    async fn exchange(&self, code: &str, _state: &str) -> anyhow::Result<SocialUserInfo> {
        let token_doc: Value = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let access_token = field_string(&token_doc, "access_token")
            .ok_or_else(|| anyhow::anyhow!("token response has no access_token: {}", token_doc))?;

        let user_doc: Value = self
            .http
            .get(&self.config.user_info_url)
            .bearer_auth(&access_token)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let openid = field_string(&user_doc, &self.config.open_id_field).ok_or_else(|| {
            anyhow::anyhow!("user info has no {} field", self.config.open_id_field)
        })?;

        Ok(SocialUserInfo {
            openid,
            token: Some(access_token),
            nickname: field_string(&user_doc, &self.config.nickname_field).unwrap_or_default(),
            avatar: field_string(&user_doc, &self.config.avatar_field).unwrap_or_default(),
            raw_token_info: Some(token_doc.to_string()),
            raw_user_info: Some(user_doc.to_string()),
        })
    }
}

pub struct SocialUserService {
    db: DatabaseConnection,
    clients: HashMap<i32, Arc<dyn SocialClient>>,
}

impl SocialUserService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            clients: HashMap::new(),
        }
    }

    /// Build OAuth2 clients for every configured provider
    pub fn from_config(db: DatabaseConnection, config: &SocialConfig) -> Self {
        let mut service = Self::new(db);
        for (social_type, provider) in &config.providers {
            match social_type.parse::<i32>() {
                Ok(social_type) => {
                    service.register(social_type, Arc::new(OAuth2Client::new(provider.clone())))
                }
                Err(_) => tracing::warn!("Ignoring social provider with bad type {:?}", social_type),
            }
        }
        service
    }

    pub fn register(&mut self, social_type: i32, client: Arc<dyn SocialClient>) {
        self.clients.insert(social_type, client);
    }

    fn client(&self, social_type: i32) -> AppResult<&Arc<dyn SocialClient>> {
        self.clients
            .get(&social_type)
            .ok_or_else(|| AppError::param(format!("社交平台({})未配置", social_type)))
    }

    pub fn authorize_url(&self, social_type: i32, redirect_uri: &str) -> AppResult<String> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        self.client(social_type)?.authorize_url(redirect_uri, &state)
    }

    /// Resolve the social account for an authorization code, persisting it
    pub async fn auth_social_user(
        &self,
        social_type: i32,
        code: &str,
        state: &str,
    ) -> AppResult<social_user::Model> {
        // the same code is only exchanged once
        let cached = social_user::Entity::find()
            .filter(social_user::Column::SocialType.eq(social_type))
            .filter(social_user::Column::Code.eq(code))
            .filter(social_user::Column::State.eq(state))
            .one(&self.db)
            .await?;
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let info = self
            .client(social_type)?
            .exchange(code, state)
            .await
            .map_err(|e| {
                tracing::warn!("Social auth failed for type {}: {}", social_type, e);
                AppError::param("社交授权失败，请重新授权")
            })?;

        let existing = social_user::Entity::find()
            .filter(social_user::Column::SocialType.eq(social_type))
            .filter(social_user::Column::Openid.eq(info.openid.as_str()))
            .one(&self.db)
            .await?;

        let now = now();
        let model = match existing {
            Some(existing) => {
                let mut active: social_user::ActiveModel = existing.into();
                active.token = Set(info.token);
                active.raw_token_info = Set(info.raw_token_info);
                active.nickname = Set(info.nickname);
                active.avatar = Set(info.avatar);
                active.raw_user_info = Set(info.raw_user_info);
                active.code = Set(code.to_string());
                active.state = Set(state.to_string());
                active.update_time = Set(now);
                active.update(&self.db).await?
            }
            None => {
                social_user::ActiveModel {
                    social_type: Set(social_type),
                    openid: Set(info.openid),
                    token: Set(info.token),
                    raw_token_info: Set(info.raw_token_info),
                    nickname: Set(info.nickname),
                    avatar: Set(info.avatar),
                    raw_user_info: Set(info.raw_user_info),
                    code: Set(code.to_string()),
                    state: Set(state.to_string()),
                    create_time: Set(now),
                    update_time: Set(now),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?
            }
        };
        Ok(model)
    }

    /// Local user bound to the social account, if any
    pub async fn bound_user_id(
        &self,
        user_type: i32,
        social_user_id: i64,
    ) -> AppResult<Option<i64>> {
        let bind = social_user_bind::Entity::find()
            .filter(social_user_bind::Column::UserType.eq(user_type))
            .filter(social_user_bind::Column::SocialUserId.eq(social_user_id))
            .one(&self.db)
            .await?;
        Ok(bind.map(|b| b.user_id))
    }

    /// Bind the social account behind `code` to a local user.
    ///
    /// A social account binds to one user, and a user holds at most one account
    /// per social type; older bindings are replaced.
    pub async fn bind(
        &self,
        tenant_id: i64,
        user_id: i64,
        user_type: i32,
        social_type: i32,
        code: &str,
        state: &str,
    ) -> AppResult<String> {
        let social_user = self.auth_social_user(social_type, code, state).await?;

        let txn = self.db.begin().await?;
        social_user_bind::Entity::delete_many()
            .filter(social_user_bind::Column::UserType.eq(user_type))
            .filter(
                Condition::any()
                    .add(social_user_bind::Column::SocialUserId.eq(social_user.id))
                    .add(
                        Condition::all()
                            .add(social_user_bind::Column::UserId.eq(user_id))
                            .add(social_user_bind::Column::SocialType.eq(social_type)),
                    ),
            )
            .exec(&txn)
            .await?;
        social_user_bind::ActiveModel {
            tenant_id: Set(tenant_id),
            user_id: Set(user_id),
            user_type: Set(user_type),
            social_type: Set(social_type),
            social_user_id: Set(social_user.id),
            create_time: Set(now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::info!(
            "Social account {}:{} bound to user {}",
            social_type,
            social_user.openid,
            user_id
        );
        Ok(social_user.openid)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing;

    /// Client that maps codes to openids without network access
    pub(crate) struct StaticSocialClient;

    #[async_trait]
    impl SocialClient for StaticSocialClient {
        fn authorize_url(&self, redirect_uri: &str, state: &str) -> AppResult<String> {
            Ok(format!("https://social.test/auth?redirect_uri={}&state={}", redirect_uri, state))
        }

        async fn exchange(&self, code: &str, _state: &str) -> anyhow::Result<SocialUserInfo> {
            if code == "bad" {
                anyhow::bail!("invalid code");
            }
            Ok(SocialUserInfo {
                openid: format!("openid-{}", code),
                nickname: "social".to_string(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_field_string() {
        let doc = serde_json::json!({"id": 123, "login": "yudao", "x": null});
        assert_eq!(field_string(&doc, "id").as_deref(), Some("123"));
        assert_eq!(field_string(&doc, "login").as_deref(), Some("yudao"));
        assert_eq!(field_string(&doc, "x"), None);
    }

    #[test]
    fn test_oauth2_authorize_url() {
        let client = OAuth2Client::new(SocialProviderConfig {
            client_id: "cid".to_string(),
            client_secret: String::new(),
            authorize_url: "https://gitee.com/oauth/authorize".to_string(),
            token_url: "https://gitee.com/oauth/token".to_string(),
            user_info_url: "https://gitee.com/api/v5/user".to_string(),
            open_id_field: "id".to_string(),
            nickname_field: "name".to_string(),
            avatar_field: "avatar_url".to_string(),
        });
        let url = client
            .authorize_url("http://localhost/callback", "s1")
            .unwrap();
        assert!(url.starts_with("https://gitee.com/oauth/authorize?response_type=code"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%2Fcallback"));
    }

    #[tokio::test]
    async fn test_bind_replaces_previous_binding() {
        let db = testing::memory_db().await;
        let mut service = SocialUserService::new(db.clone());
        service.register(10, Arc::new(StaticSocialClient));

        service.bind(1, 100, 2, 10, "c1", "s").await.unwrap();
        let social = service.auth_social_user(10, "c1", "s").await.unwrap();
        assert_eq!(social.openid, "openid-c1");
        assert_eq!(service.bound_user_id(2, social.id).await.unwrap(), Some(100));

        // same social account moves to another user
        service.bind(1, 200, 2, 10, "c1", "s").await.unwrap();
        assert_eq!(service.bound_user_id(2, social.id).await.unwrap(), Some(200));
        let binds = social_user_bind::Entity::find().all(&db).await.unwrap();
        assert_eq!(binds.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_and_failed_exchange() {
        let db = testing::memory_db().await;
        let mut service = SocialUserService::new(db);
        assert!(matches!(
            service.authorize_url(10, "http://x"),
            Err(AppError::Param(_))
        ));
        service.register(10, Arc::new(StaticSocialClient));
        assert!(service.authorize_url(10, "http://x").is_ok());
        assert!(matches!(
            service.auth_social_user(10, "bad", "s").await,
            Err(AppError::Param(_))
        ));
    }
}
