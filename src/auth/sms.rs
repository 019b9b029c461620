//! SMS verification codes
//!
//! Codes, send cooldowns and daily counters are all kept in the cache,
//! keyed by scene and mobile.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::config::SmsConfig;
use crate::error::{AppError, AppResult};

/// 短信验证码发送场景
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum SmsScene {
    MemberLogin = 1,
    MemberUpdateMobile = 2,
    MemberUpdatePassword = 3,
    MemberResetPassword = 4,
    AdminMemberLogin = 21,
    AdminMemberRegister = 22,
    AdminMemberResetPassword = 23,
}

impl SmsScene {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Message template used for the scene
    pub fn template_code(self) -> &'static str {
        match self {
            SmsScene::MemberLogin => "user-sms-login",
            SmsScene::MemberUpdateMobile => "user-update-mobile",
            SmsScene::MemberUpdatePassword => "user-update-password",
            SmsScene::MemberResetPassword => "user-reset-password",
            SmsScene::AdminMemberLogin => "admin-sms-login",
            SmsScene::AdminMemberRegister => "admin-sms-register",
            SmsScene::AdminMemberResetPassword => "admin-reset-password",
        }
    }
}

impl From<SmsScene> for i32 {
    fn from(scene: SmsScene) -> Self {
        scene as i32
    }
}

impl TryFrom<i32> for SmsScene {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => SmsScene::MemberLogin,
            2 => SmsScene::MemberUpdateMobile,
            3 => SmsScene::MemberUpdatePassword,
            4 => SmsScene::MemberResetPassword,
            21 => SmsScene::AdminMemberLogin,
            22 => SmsScene::AdminMemberRegister,
            23 => SmsScene::AdminMemberResetPassword,
            other => return Err(format!("unknown sms scene {}", other)),
        })
    }
}

/// Delivery of a rendered code to a vendor
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, mobile: &str, template_code: &str, code: &str) -> anyhow::Result<()>;
}

/// Sender that only writes the code to the log
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, mobile: &str, template_code: &str, code: &str) -> anyhow::Result<()> {
        tracing::info!("SMS [{}] to {}: code {}", template_code, mobile, code);
        Ok(())
    }
}

pub struct SmsCodeService {
    cache: Arc<dyn CacheStore>,
    sender: Arc<dyn SmsSender>,
    config: SmsConfig,
}

pub(crate) fn code_key(mobile: &str, scene: SmsScene) -> String {
    format!("sms_code:{}:{}", scene.code(), mobile)
}

fn cooldown_key(mobile: &str, scene: SmsScene) -> String {
    format!("sms_code_cooldown:{}:{}", scene.code(), mobile)
}

fn daily_key(mobile: &str, scene: SmsScene) -> String {
    let day = chrono::Local::now().format("%Y%m%d");
    format!("sms_code_daily:{}:{}:{}", scene.code(), mobile, day)
}

const DAY: Duration = Duration::from_secs(24 * 3600);

impl SmsCodeService {
    pub fn new(cache: Arc<dyn CacheStore>, sender: Arc<dyn SmsSender>, config: SmsConfig) -> Self {
        Self {
            cache,
            sender,
            config,
        }
    }

    /// Issue a fresh code for the mobile and scene
    pub async fn send_code(&self, mobile: &str, scene: SmsScene) -> AppResult<()> {
        validate_mobile(mobile)?;

        let cooldown = Duration::from_secs(self.config.send_frequency_secs);
        if !self
            .cache
            .set_nx_ex(&cooldown_key(mobile, scene), "1", cooldown)
            .await?
        {
            return Err(AppError::param("短信发送过于频繁"));
        }

        let sent_today = self.cache.incr(&daily_key(mobile, scene), DAY).await?;
        if sent_today > self.config.daily_limit {
            return Err(AppError::param("超过每日短信发送数量"));
        }

        let code = generate_code(self.config.code_length);
        self.cache
            .set_ex(
                &code_key(mobile, scene),
                &code,
                Duration::from_secs(self.config.expire_secs),
            )
            .await?;

        if let Err(e) = self
            .sender
            .send(mobile, scene.template_code(), &code)
            .await
        {
            tracing::error!("Failed to deliver sms code to {}: {}", mobile, e);
        }
        Ok(())
    }

    /// Check the code and consume it on success
    pub async fn use_code(&self, mobile: &str, scene: SmsScene, code: &str) -> AppResult<()> {
        let key = code_key(mobile, scene);
        let Some(expected) = self.cache.get(&key).await? else {
            return Err(AppError::param("验证码不存在或已过期"));
        };
        if expected != code {
            return Err(AppError::param("验证码不正确"));
        }
        self.cache.delete(&key).await?;
        Ok(())
    }
}

fn validate_mobile(mobile: &str) -> AppResult<()> {
    if mobile.len() == 11 && mobile.starts_with('1') && mobile.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::param("手机号格式不正确"))
    }
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length.max(1))
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
