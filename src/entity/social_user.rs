//! SocialUser entity - 社交用户表
//!
//! 表名: system_social_user
//! 以 (social_type, openid) 唯一标识一个三方账号

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_social_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 社交平台类型
    pub social_type: i32,

    /// 社交平台的 openid
    #[sea_orm(column_type = "String(Some(64))")]
    pub openid: String,

    /// 社交平台的 access token
    #[sea_orm(column_type = "String(Some(512))", nullable)]
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// 原始 token 数据 (JSON)
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_token_info: Option<String>,

    #[sea_orm(column_type = "String(Some(64))", default_value = "")]
    pub nickname: String,

    #[sea_orm(column_type = "String(Some(512))", default_value = "")]
    pub avatar: String,

    /// 原始用户数据 (JSON)
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_user_info: Option<String>,

    /// 最后一次的认证 code
    #[sea_orm(column_type = "String(Some(256))", default_value = "")]
    pub code: String,

    /// 最后一次的认证 state
    #[sea_orm(column_type = "String(Some(256))", default_value = "")]
    pub state: String,

    pub create_time: DateTime,
    pub update_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
