//! Tenant entity - 租户表
//!
//! 表名: system_tenant

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::CommonStatus;

/// 系统租户的套餐编号
pub const PACKAGE_ID_SYSTEM: i64 = 0;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_tenant")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 租户名 (唯一)
    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// 联系人的用户编号
    #[sea_orm(nullable)]
    pub contact_user_id: Option<i64>,

    /// 联系人
    #[sea_orm(column_type = "String(Some(32))")]
    pub contact_name: String,

    /// 联系手机
    #[sea_orm(column_type = "String(Some(16))", nullable)]
    pub contact_mobile: Option<String>,

    /// 租户状态: 0=开启, 1=关闭
    pub status: i32,

    /// 绑定域名 (逗号分隔，跨租户唯一)
    #[sea_orm(column_type = "String(Some(512))", default_value = "")]
    pub websites: String,

    /// 租户套餐编号 (0 表示系统租户)
    pub package_id: i64,

    /// 过期时间
    pub expire_time: DateTime,

    /// 账号数量
    pub account_count: i32,

    pub creator: Option<i64>,
    pub create_time: DateTime,
    pub update_time: DateTime,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 是否为系统租户
    pub fn is_system(&self) -> bool {
        self.package_id == PACKAGE_ID_SYSTEM
    }

    /// 租户有效: 开启且未过期
    pub fn is_valid(&self, now: DateTime) -> bool {
        CommonStatus::is_enable(self.status) && now < self.expire_time
    }

    pub fn website_list(&self) -> Vec<String> {
        split_websites(&self.websites)
    }
}

/// 拆分域名列表，去除空白并保持顺序去重
pub fn split_websites(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for site in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|s| s == site) {
            out.push(site.to_string());
        }
    }
    out
}
