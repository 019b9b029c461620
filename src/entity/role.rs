//! Role entity - 角色表
//!
//! 表名: system_role

use std::collections::BTreeSet;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 角色类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleType {
    /// 内置角色
    System = 1,
    /// 自定义角色
    Custom = 2,
}

impl From<i32> for RoleType {
    fn from(value: i32) -> Self {
        match value {
            1 => RoleType::System,
            _ => RoleType::Custom,
        }
    }
}

/// 超级管理员
pub const CODE_SUPER_ADMIN: &str = "super_admin";
/// 租户管理员
pub const CODE_TENANT_ADMIN: &str = "tenant_admin";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_role")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tenant_id: i64,

    /// 角色名称 (租户内唯一)
    #[sea_orm(column_type = "String(Some(30))")]
    pub name: String,

    /// 角色标识 (租户内唯一)
    #[sea_orm(column_type = "String(Some(100))")]
    pub code: String,

    pub sort: i32,

    /// 角色类型: 1=内置, 2=自定义
    pub role_type: i32,

    /// 状态: 0=开启, 1=关闭
    pub status: i32,

    /// 数据范围: 1=全部, 2=指定部门, 3=本部门, 4=本部门及以下, 5=仅本人
    pub data_scope: i32,

    /// 数据范围 (指定部门数组)
    #[sea_orm(column_type = "Text")]
    pub data_scope_dept_ids: String,

    #[sea_orm(column_type = "String(Some(500))", default_value = "")]
    pub remark: String,

    pub creator: Option<i64>,
    pub create_time: DateTime,
    pub update_time: DateTime,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_super_admin(&self) -> bool {
        self.code == CODE_SUPER_ADMIN
    }

    pub fn is_tenant_admin(&self) -> bool {
        self.code == CODE_TENANT_ADMIN
    }

    pub fn is_system(&self) -> bool {
        RoleType::from(self.role_type) == RoleType::System
    }

    pub fn data_scope_dept_id_set(&self) -> BTreeSet<i64> {
        super::parse_id_set(&self.data_scope_dept_ids)
    }
}
