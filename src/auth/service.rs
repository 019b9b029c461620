//! Login flows for admin users

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::Deserialize;

use super::login_log::{LoginLogEntry, LoginLogWriter};
use super::{
    ClientInfo, LoginUser, SmsCodeService, SmsScene, SocialUserService, TokenBundle, TokenService,
    UserType,
};
use crate::config::Config;
use crate::entity::login_log::{LoginLogType, LoginResult};
use crate::entity::{now, tenant, user, CommonStatus};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    /// Social account to bind after a successful login
    #[serde(default)]
    pub social_type: Option<i32>,
    #[serde(default)]
    pub social_code: Option<String>,
    #[serde(default)]
    pub social_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsLoginRequest {
    pub mobile: String,
    pub code: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLoginRequest {
    #[serde(rename = "type")]
    pub social_type: i32,
    pub code: String,
    pub state: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub mobile: String,
    pub code: String,
    pub password: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsCodeRequest {
    pub mobile: String,
    pub scene: i32,
}

pub struct AuthService {
    db: DatabaseConnection,
    config: Arc<Config>,
    tokens: Arc<TokenService>,
    sms: Arc<SmsCodeService>,
    social: Arc<SocialUserService>,
    login_logs: LoginLogWriter,
}

impl AuthService {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<Config>,
        tokens: Arc<TokenService>,
        sms: Arc<SmsCodeService>,
        social: Arc<SocialUserService>,
        login_logs: LoginLogWriter,
    ) -> Self {
        Self {
            db,
            config,
            tokens,
            sms,
            social,
            login_logs,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Tenant a login applies to; the default tenant when no name is given
    pub async fn resolve_tenant(&self, tenant_name: Option<&str>) -> AppResult<tenant::Model> {
        let query = tenant::Entity::find().filter(tenant::Column::Deleted.eq(false));
        let found = match tenant_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => query.filter(tenant::Column::Name.eq(name)).one(&self.db).await?,
            None => {
                query
                    .filter(tenant::Column::Id.eq(self.config.default_tenant_id))
                    .one(&self.db)
                    .await?
            }
        };
        let tenant = found.ok_or_else(|| AppError::not_found("租户不存在"))?;
        if !tenant.is_valid(now()) {
            return Err(AppError::Forbidden(format!(
                "租户({})已禁用或已过期",
                tenant.name
            )));
        }
        Ok(tenant)
    }

    /// POST /system/auth/login
    pub async fn login(&self, req: LoginRequest, client: &ClientInfo) -> AppResult<TokenBundle> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(AppError::param("账号和密码不能为空"));
        }
        let tenant = self.resolve_tenant(req.tenant_name.as_deref()).await?;

        let found = user::Entity::find()
            .filter(user::Column::TenantId.eq(tenant.id))
            .filter(user::Column::Username.eq(req.username.trim()))
            .filter(user::Column::Deleted.eq(false))
            .one(&self.db)
            .await?;

        let log_type = LoginLogType::LoginUsername;
        let Some(user) = found else {
            tracing::warn!("Login failed: user not found - {}", req.username);
            self.record_failure(tenant.id, None, &req.username, log_type, LoginResult::BadCredentials, client);
            return Err(AppError::BadCredentials);
        };
        if !bcrypt::verify(&req.password, &user.password).unwrap_or(false) {
            tracing::warn!("Login failed: wrong password - {}", req.username);
            self.record_failure(tenant.id, Some(user.id), &user.username, log_type, LoginResult::BadCredentials, client);
            return Err(AppError::BadCredentials);
        }
        if !CommonStatus::is_enable(user.status) {
            tracing::warn!("Login failed: user disabled - {}", req.username);
            self.record_failure(tenant.id, Some(user.id), &user.username, log_type, LoginResult::UserDisabled, client);
            return Err(AppError::BadCredentials);
        }

        if let (Some(social_type), Some(code), Some(state)) =
            (req.social_type, req.social_code.as_deref(), req.social_state.as_deref())
        {
            self.social
                .bind(
                    tenant.id,
                    user.id,
                    UserType::Admin.into(),
                    social_type,
                    code,
                    state,
                )
                .await?;
        }

        self.create_token_after_login(user, log_type, client).await
    }

    /// POST /system/auth/sms-login
    pub async fn sms_login(&self, req: SmsLoginRequest, client: &ClientInfo) -> AppResult<TokenBundle> {
        let tenant = self.resolve_tenant(req.tenant_name.as_deref()).await?;
        self.sms
            .use_code(&req.mobile, SmsScene::AdminMemberLogin, &req.code)
            .await?;

        let log_type = LoginLogType::LoginSms;
        let found = self.find_by_mobile(tenant.id, &req.mobile).await?;
        let Some(user) = found else {
            self.record_failure(tenant.id, None, &req.mobile, log_type, LoginResult::BadCredentials, client);
            return Err(AppError::BadCredentials);
        };
        if !CommonStatus::is_enable(user.status) {
            self.record_failure(tenant.id, Some(user.id), &user.username, log_type, LoginResult::UserDisabled, client);
            return Err(AppError::BadCredentials);
        }
        self.create_token_after_login(user, log_type, client).await
    }

    /// POST /system/auth/social-login
    pub async fn social_login(
        &self,
        req: SocialLoginRequest,
        client: &ClientInfo,
    ) -> AppResult<TokenBundle> {
        let tenant = self.resolve_tenant(req.tenant_name.as_deref()).await?;
        let social_user = self
            .social
            .auth_social_user(req.social_type, &req.code, &req.state)
            .await?;

        let user_id = self
            .social
            .bound_user_id(UserType::Admin.into(), social_user.id)
            .await?
            .ok_or(AppError::SocialNotBound)?;

        let log_type = LoginLogType::LoginSocial;
        let found = user::Entity::find_by_id(user_id)
            .filter(user::Column::Deleted.eq(false))
            .one(&self.db)
            .await?;
        let Some(user) = found else {
            self.record_failure(tenant.id, Some(user_id), &social_user.openid, log_type, LoginResult::BadCredentials, client);
            return Err(AppError::BadCredentials);
        };
        if user.tenant_id != tenant.id {
            return Err(AppError::SocialNotBound);
        }
        if !CommonStatus::is_enable(user.status) {
            self.record_failure(tenant.id, Some(user.id), &user.username, log_type, LoginResult::UserDisabled, client);
            return Err(AppError::BadCredentials);
        }
        self.create_token_after_login(user, log_type, client).await
    }

    /// POST /system/auth/refresh-token
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenBundle> {
        let record = self.tokens.check_refresh_token(refresh_token).await?;
        let user = user::Entity::find_by_id(record.user_id)
            .filter(user::Column::Deleted.eq(false))
            .one(&self.db)
            .await?
            .filter(|u| CommonStatus::is_enable(u.status))
            .ok_or_else(|| AppError::Unauthorized("用户已禁用或不存在".to_string()))?;

        self.tokens
            .create_token(&LoginUser {
                user_id: user.id,
                user_type: record.user_type,
                tenant_id: record.tenant_id,
                nickname: user.nickname,
            })
            .await
    }

    /// POST /system/auth/logout; unknown tokens are ignored
    pub async fn logout(&self, token: &str, client: &ClientInfo) -> AppResult<()> {
        let Some(record) = self.tokens.remove_access_token(token).await? else {
            return Ok(());
        };
        self.login_logs.record(LoginLogEntry {
            tenant_id: record.tenant_id,
            log_type: LoginLogType::LogoutSelf,
            user_id: Some(record.user_id),
            user_type: record.user_type.into(),
            username: record.user_info.get("nickname").cloned().unwrap_or_default(),
            result: LoginResult::Success,
            user_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        });
        Ok(())
    }

    pub async fn validate(&self, token: &str) -> AppResult<LoginUser> {
        self.tokens.validate(token).await
    }

    /// POST /system/auth/register
    pub async fn register(&self, req: RegisterRequest, client: &ClientInfo) -> AppResult<TokenBundle> {
        let username = req.username.trim();
        if username.len() < 4 || username.len() > 30 {
            return Err(AppError::param("用户账号长度为 4-30 个字符"));
        }
        validate_password(&req.password)?;
        let tenant = self.resolve_tenant(req.tenant_name.as_deref()).await?;

        let exists = user::Entity::find()
            .filter(user::Column::TenantId.eq(tenant.id))
            .filter(user::Column::Username.eq(username))
            .filter(user::Column::Deleted.eq(false))
            .count(&self.db)
            .await?;
        if exists > 0 {
            return Err(AppError::conflict("用户账号已经存在"));
        }
        if tenant.account_count > 0 {
            let accounts = user::Entity::find()
                .filter(user::Column::TenantId.eq(tenant.id))
                .filter(user::Column::Deleted.eq(false))
                .count(&self.db)
                .await?;
            if accounts >= tenant.account_count as u64 {
                return Err(AppError::conflict("创建用户失败，原因：超过租户最大租户配额"));
            }
        }

        let now = now();
        let user = user::ActiveModel {
            tenant_id: Set(tenant.id),
            username: Set(username.to_string()),
            password: Set(self.hash_password(&req.password)?),
            nickname: Set(req.nickname.unwrap_or_else(|| username.to_string())),
            remark: Set(String::new()),
            avatar: Set(String::new()),
            status: Set(CommonStatus::Enable.into()),
            create_time: Set(now),
            update_time: Set(now),
            deleted: Set(false),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        tracing::info!("User registered: {} (tenant {})", user.username, tenant.id);

        self.create_token_after_login(user, LoginLogType::LoginUsername, client)
            .await
    }

    /// POST /system/auth/reset-password
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> AppResult<()> {
        validate_password(&req.password)?;
        let tenant = self.resolve_tenant(req.tenant_name.as_deref()).await?;
        self.sms
            .use_code(&req.mobile, SmsScene::AdminMemberResetPassword, &req.code)
            .await?;

        let user = self
            .find_by_mobile(tenant.id, &req.mobile)
            .await?
            .ok_or_else(|| AppError::not_found("手机号对应的用户不存在"))?;

        let user_id = user.id;
        let mut active: user::ActiveModel = user.into();
        active.password = Set(self.hash_password(&req.password)?);
        active.update_time = Set(now());
        active.update(&self.db).await?;
        tracing::info!("Password reset by sms for user {}", user_id);
        Ok(())
    }

    /// POST /system/auth/send-sms-code
    pub async fn send_sms_code(&self, req: SendSmsCodeRequest) -> AppResult<()> {
        let scene = SmsScene::try_from(req.scene).map_err(AppError::param)?;
        self.sms.send_code(&req.mobile, scene).await
    }

    /// GET /system/auth/social-auth-redirect
    pub fn social_authorize_url(&self, social_type: i32, redirect_uri: &str) -> AppResult<String> {
        self.social.authorize_url(social_type, redirect_uri)
    }

    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        bcrypt::hash(password, self.config.auth.bcrypt_cost)
            .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))
    }

    async fn find_by_mobile(&self, tenant_id: i64, mobile: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::TenantId.eq(tenant_id))
            .filter(user::Column::Mobile.eq(mobile))
            .filter(user::Column::Deleted.eq(false))
            .one(&self.db)
            .await?)
    }

    async fn create_token_after_login(
        &self,
        user: user::Model,
        log_type: LoginLogType,
        client: &ClientInfo,
    ) -> AppResult<TokenBundle> {
        self.login_logs.record(LoginLogEntry {
            tenant_id: user.tenant_id,
            log_type,
            user_id: Some(user.id),
            user_type: UserType::Admin.into(),
            username: user.username.clone(),
            result: LoginResult::Success,
            user_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        });

        let login_user = LoginUser {
            user_id: user.id,
            user_type: UserType::Admin,
            tenant_id: user.tenant_id,
            nickname: user.nickname.clone(),
        };

        let mut active: user::ActiveModel = user.into();
        active.login_ip = Set(Some(client.ip.clone()));
        active.login_date = Set(Some(now()));
        if let Err(e) = active.update(&self.db).await {
            tracing::warn!("Failed to update last login of user {}: {}", login_user.user_id, e);
        }

        tracing::info!("User logged in: {} (tenant {})", login_user.user_id, login_user.tenant_id);
        self.tokens.create_token(&login_user).await
    }

    fn record_failure(
        &self,
        tenant_id: i64,
        user_id: Option<i64>,
        username: &str,
        log_type: LoginLogType,
        result: LoginResult,
        client: &ClientInfo,
    ) {
        self.login_logs.record(LoginLogEntry {
            tenant_id,
            log_type,
            user_id,
            user_type: UserType::Admin.into(),
            username: username.to_string(),
            result,
            user_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        });
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 4 || password.len() > 16 {
        return Err(AppError::param("密码长度为 4-16 位"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sms::{code_key, LogSmsSender};
    use crate::auth::social::tests::StaticSocialClient;
    use crate::cache::{CacheStore, MemoryCache};
    use crate::entity::login_log;
    use crate::testing;
    use std::time::Duration;

    struct Fixture {
        auth: AuthService,
        cache: MemoryCache,
        db: DatabaseConnection,
    }

    async fn fixture() -> Fixture {
        let db = testing::seeded_db().await;
        let config = Arc::new(testing::test_config());
        let cache = MemoryCache::new();
        let store: Arc<dyn CacheStore> = Arc::new(cache.clone());
        let mut social = SocialUserService::new(db.clone());
        social.register(10, Arc::new(StaticSocialClient));
        let auth = AuthService::new(
            db.clone(),
            config.clone(),
            Arc::new(TokenService::new(&config.jwt, store.clone())),
            Arc::new(SmsCodeService::new(
                store,
                Arc::new(LogSmsSender),
                config.sms.clone(),
            )),
            Arc::new(social),
            LoginLogWriter::spawn(db.clone()),
        );
        Fixture { auth, cache, db }
    }

    fn admin_login() -> LoginRequest {
        LoginRequest {
            username: "admin".to_string(),
            password: "admin123".to_string(),
            tenant_name: Some("default".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_login_validate_logout() {
        let f = fixture().await;
        let client = ClientInfo::default();
        let bundle = f.auth.login(admin_login(), &client).await.unwrap();

        let identity = f.auth.validate(&bundle.access_token).await.unwrap();
        assert_eq!(identity.user_id, bundle.user_id);
        assert_eq!(identity.tenant_id, 1);
        assert_eq!(identity.user_type, UserType::Admin);

        f.auth.logout(&bundle.access_token, &client).await.unwrap();
        assert!(matches!(
            f.auth.validate(&bundle.access_token).await,
            Err(AppError::Unauthorized(_))
        ));
        // idempotent
        f.auth.logout(&bundle.access_token, &client).await.unwrap();

        let db = &f.db;
        let logs = testing::eventually(Duration::from_secs(2), move || async move {
            let logs = login_log::Entity::find().all(db).await.unwrap();
            (logs.len() >= 2).then_some(logs)
        })
        .await;
        assert!(logs.iter().any(|l| l.log_type == 200));

        let user = user::Entity::find_by_id(bundle.user_id)
            .one(&f.db)
            .await
            .unwrap()
            .unwrap();
        assert!(user.login_date.is_some());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let f = fixture().await;
        let client = ClientInfo::default();

        let wrong_password = LoginRequest {
            password: "nope".to_string(),
            ..admin_login()
        };
        let missing_user = LoginRequest {
            username: "ghost".to_string(),
            ..admin_login()
        };
        for req in [wrong_password, missing_user] {
            let err = f.auth.login(req, &client).await.unwrap_err();
            assert!(matches!(err, AppError::BadCredentials));
        }

        let disabled = testing::insert_user(&f.db, 1, "disabled", None).await;
        let mut active: user::ActiveModel = disabled.into();
        active.status = Set(CommonStatus::Disable.into());
        active.update(&f.db).await.unwrap();
        let err = f
            .auth
            .login(
                LoginRequest {
                    username: "disabled".to_string(),
                    password: testing::DEFAULT_PASSWORD.to_string(),
                    ..Default::default()
                },
                &client,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadCredentials));
    }

    #[tokio::test]
    async fn test_unknown_or_disabled_tenant() {
        let f = fixture().await;
        let err = f
            .auth
            .login(
                LoginRequest {
                    tenant_name: Some("nobody".to_string()),
                    ..admin_login()
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let mut tenant: tenant::ActiveModel = tenant::Entity::find_by_id(1)
            .one(&f.db)
            .await
            .unwrap()
            .unwrap()
            .into();
        tenant.status = Set(CommonStatus::Disable.into());
        tenant.update(&f.db).await.unwrap();
        let err = f
            .auth
            .login(admin_login(), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair() {
        let f = fixture().await;
        let bundle = f
            .auth
            .login(admin_login(), &ClientInfo::default())
            .await
            .unwrap();
        let refreshed = f.auth.refresh(&bundle.refresh_token).await.unwrap();
        assert_ne!(refreshed.access_token, bundle.access_token);

        // old pair stays valid until it expires
        assert!(f.auth.validate(&bundle.access_token).await.is_ok());
        assert!(f.auth.validate(&refreshed.access_token).await.is_ok());
        assert!(f.auth.refresh(&bundle.access_token).await.is_err());
    }

    #[tokio::test]
    async fn test_sms_login_and_reset_password() {
        let f = fixture().await;
        let user = testing::insert_user(&f.db, 1, "mobile", None).await;
        let mut active: user::ActiveModel = user.into();
        active.mobile = Set(Some("15601691300".to_string()));
        active.update(&f.db).await.unwrap();

        f.auth
            .send_sms_code(SendSmsCodeRequest {
                mobile: "15601691300".to_string(),
                scene: SmsScene::AdminMemberLogin.code(),
            })
            .await
            .unwrap();
        let code = f
            .cache
            .get(&code_key("15601691300", SmsScene::AdminMemberLogin))
            .await
            .unwrap()
            .unwrap();

        let bad = f
            .auth
            .sms_login(
                SmsLoginRequest {
                    mobile: "15601691300".to_string(),
                    code: "0000x".to_string(),
                    tenant_name: None,
                },
                &ClientInfo::default(),
            )
            .await;
        assert!(matches!(bad, Err(AppError::Param(_))));

        let bundle = f
            .auth
            .sms_login(
                SmsLoginRequest {
                    mobile: "15601691300".to_string(),
                    code,
                    tenant_name: None,
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        assert!(f.auth.validate(&bundle.access_token).await.is_ok());

        f.auth
            .send_sms_code(SendSmsCodeRequest {
                mobile: "15601691300".to_string(),
                scene: SmsScene::AdminMemberResetPassword.code(),
            })
            .await
            .unwrap();
        let code = f
            .cache
            .get(&code_key("15601691300", SmsScene::AdminMemberResetPassword))
            .await
            .unwrap()
            .unwrap();
        f.auth
            .reset_password(ResetPasswordRequest {
                mobile: "15601691300".to_string(),
                code,
                password: "newpass1".to_string(),
                tenant_name: None,
            })
            .await
            .unwrap();
        f.auth
            .login(
                LoginRequest {
                    username: "mobile".to_string(),
                    password: "newpass1".to_string(),
                    ..Default::default()
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_social_login_requires_binding() {
        let f = fixture().await;
        let req = SocialLoginRequest {
            social_type: 10,
            code: "c1".to_string(),
            state: "s1".to_string(),
            tenant_name: None,
        };
        let err = f
            .auth
            .social_login(req.clone(), &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SocialNotBound));

        // password login carrying the social code binds the account
        f.auth
            .login(
                LoginRequest {
                    social_type: Some(10),
                    social_code: Some("c1".to_string()),
                    social_state: Some("s1".to_string()),
                    ..admin_login()
                },
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        let bundle = f
            .auth
            .social_login(req, &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(bundle.user_id, testing::ADMIN_USER_ID);
    }

    #[tokio::test]
    async fn test_register() {
        let f = fixture().await;
        let req = RegisterRequest {
            username: "newbie".to_string(),
            password: "secret1".to_string(),
            nickname: None,
            tenant_name: None,
        };
        let bundle = f
            .auth
            .register(req.clone(), &ClientInfo::default())
            .await
            .unwrap();
        let identity = f.auth.validate(&bundle.access_token).await.unwrap();
        assert_eq!(identity.nickname, "newbie");

        let err = f
            .auth
            .register(req, &ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
