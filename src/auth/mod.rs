//! Authentication: credential checks, token lifecycle, SMS codes and social binding

use serde::{Deserialize, Serialize};

pub mod jwt;
pub mod login_log;
pub mod service;
pub mod sms;
pub mod social;
pub mod token;

pub use jwt::JwtManager;
pub use login_log::LoginLogWriter;
pub use service::AuthService;
pub use sms::{LogSmsSender, SmsCodeService, SmsScene};
pub use social::SocialUserService;
pub use token::{TokenBundle, TokenService};

/// 用户类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum UserType {
    /// 会员 (C 端)
    Member = 1,
    /// 管理员 (管理后台)
    Admin = 2,
}

impl From<UserType> for i32 {
    fn from(value: UserType) -> Self {
        value as i32
    }
}

impl TryFrom<i32> for UserType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(UserType::Member),
            2 => Ok(UserType::Admin),
            other => Err(format!("unknown user type {}", other)),
        }
    }
}

/// Identity attached to an authenticated request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub user_id: i64,
    pub user_type: UserType,
    pub tenant_id: i64,
    pub nickname: String,
}

impl LoginUser {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }
}

/// Client address and agent, recorded in login logs
#[derive(Clone, Debug, Default)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_serde() {
        assert_eq!(serde_json::to_string(&UserType::Admin).unwrap(), "2");
        let parsed: UserType = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, UserType::Member);
        assert!(serde_json::from_str::<UserType>("9").is_err());
    }
}
