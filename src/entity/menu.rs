//! Menu entity - 菜单权限表
//!
//! 表名: system_menu

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 菜单类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuType {
    /// 目录
    Dir = 1,
    /// 菜单
    Menu = 2,
    /// 按钮
    Button = 3,
}

impl TryFrom<i32> for MenuType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MenuType::Dir),
            2 => Ok(MenuType::Menu),
            3 => Ok(MenuType::Button),
            other => Err(other),
        }
    }
}

/// 根节点的父编号
pub const ROOT_ID: i64 = 0;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_menu")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(50))")]
    pub name: String,

    /// 权限标识，仅按钮使用，如 system:user:update
    #[sea_orm(column_type = "String(Some(100))", default_value = "")]
    pub permission: String,

    /// 菜单类型: 1=目录, 2=菜单, 3=按钮
    pub menu_type: i32,

    pub sort: i32,

    /// 父菜单编号 (0 表示根)
    pub parent_id: i64,

    #[sea_orm(column_type = "String(Some(200))", default_value = "")]
    pub path: String,

    #[sea_orm(column_type = "String(Some(100))", default_value = "")]
    pub icon: String,

    #[sea_orm(column_type = "String(Some(255))", default_value = "")]
    pub component: String,

    #[sea_orm(column_type = "String(Some(255))", default_value = "")]
    pub component_name: String,

    /// 状态: 0=开启, 1=关闭
    pub status: i32,

    pub visible: bool,
    pub keep_alive: bool,
    pub always_show: bool,

    pub create_time: DateTime,
    pub update_time: DateTime,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_button(&self) -> bool {
        MenuType::try_from(self.menu_type) == Ok(MenuType::Button)
    }
}

/// 前端路由树节点
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuTree {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub path: String,
    pub component: String,
    pub component_name: String,
    pub icon: String,
    pub visible: bool,
    pub keep_alive: bool,
    pub always_show: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuTree>,
}

impl From<Model> for MenuTree {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            parent_id: model.parent_id,
            name: model.name,
            path: model.path,
            component: model.component,
            component_name: model.component_name,
            icon: model.icon,
            visible: model.visible,
            keep_alive: model.keep_alive,
            always_show: model.always_show,
            children: Vec::new(),
        }
    }
}
