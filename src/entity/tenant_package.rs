//! TenantPackage entity - 租户套餐表
//!
//! 表名: system_tenant_package

use std::collections::BTreeSet;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_tenant_package")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 套餐名 (唯一)
    #[sea_orm(column_type = "String(Some(30))")]
    pub name: String,

    /// 状态: 0=开启, 1=关闭
    pub status: i32,

    #[sea_orm(column_type = "String(Some(256))", default_value = "")]
    pub remark: String,

    /// 关联的菜单编号 (JSON 数组)
    #[sea_orm(column_type = "Text")]
    pub menu_ids: String,

    pub create_time: DateTime,
    pub update_time: DateTime,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn menu_id_set(&self) -> BTreeSet<i64> {
        super::parse_id_set(&self.menu_ids)
    }
}
