//! Dept entity - 部门表
//!
//! 表名: system_dept

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 根部门的父编号
pub const ROOT_ID: i64 = 0;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_dept")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub tenant_id: i64,

    /// 部门名称
    #[sea_orm(column_type = "String(Some(30))")]
    pub name: String,

    /// 父部门编号 (0 表示顶级部门)
    pub parent_id: i64,

    pub sort: i32,

    /// 负责人
    pub leader_user_id: Option<i64>,

    /// 状态: 0=开启, 1=关闭
    pub status: i32,

    pub creator: Option<i64>,
    pub create_time: DateTime,
    pub update_time: DateTime,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
