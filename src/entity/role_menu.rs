//! RoleMenu entity - 角色和菜单关联表
//!
//! 表名: system_role_menu

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_role_menu")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tenant_id: i64,

    /// 角色编号
    pub role_id: i64,

    /// 菜单编号
    pub menu_id: i64,

    pub create_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 创建关联记录的辅助函数
pub fn new_binding(tenant_id: i64, role_id: i64, menu_id: i64) -> ActiveModel {
    use sea_orm::Set;
    ActiveModel {
        tenant_id: Set(tenant_id),
        role_id: Set(role_id),
        menu_id: Set(menu_id),
        create_time: Set(super::now()),
        ..Default::default()
    }
}
