//! SocialUserBind entity - 社交用户和本地用户的绑定表
//!
//! 表名: system_social_user_bind

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_social_user_bind")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tenant_id: i64,

    /// 本地用户编号
    pub user_id: i64,

    /// 用户类型
    pub user_type: i32,

    /// 社交平台类型 (冗余字段)
    pub social_type: i32,

    /// 社交用户编号
    pub social_user_id: i64,

    pub create_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
