//! UserRole entity - 用户和角色关联表
//!
//! 表名: system_user_role

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_user_role")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tenant_id: i64,

    /// 用户编号
    pub user_id: i64,

    /// 角色编号
    pub role_id: i64,

    pub create_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 创建关联记录的辅助函数
pub fn new_binding(tenant_id: i64, user_id: i64, role_id: i64) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        tenant_id: Set(tenant_id),
        user_id: Set(user_id),
        role_id: Set(role_id),
        create_time: Set(super::now()),
        ..Default::default()
    }
}
