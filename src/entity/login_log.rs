//! LoginLog entity - 登录日志表
//!
//! 表名: system_login_log

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 登录日志类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginLogType {
    /// 使用账号登录
    LoginUsername = 100,
    /// 使用社交登录
    LoginSocial = 101,
    /// 使用手机登录
    LoginMobile = 103,
    /// 使用短信登录
    LoginSms = 104,
    /// 自己主动登出
    LogoutSelf = 200,
    /// 强制退出
    LogoutDelete = 202,
}

/// 登录结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginResult {
    Success = 0,
    /// 账号或密码不正确
    BadCredentials = 10,
    /// 用户被禁用
    UserDisabled = 20,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_login_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tenant_id: i64,

    /// 日志类型
    pub log_type: i32,

    /// 用户编号 (登录失败时可能为空)
    pub user_id: Option<i64>,

    /// 用户类型
    pub user_type: i32,

    /// 用户账号
    #[sea_orm(column_type = "String(Some(50))")]
    pub username: String,

    /// 登录结果
    pub result: i32,

    #[sea_orm(column_type = "String(Some(50))", default_value = "")]
    pub user_ip: String,

    #[sea_orm(column_type = "String(Some(512))", default_value = "")]
    pub user_agent: String,

    pub create_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
