//! AdminUser entity - 管理后台用户表
//!
//! 表名: system_users

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "system_users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 租户编号
    pub tenant_id: i64,

    /// 用户名 (租户内唯一)
    #[sea_orm(column_type = "String(Some(30))")]
    pub username: String,

    /// 密码 (bcrypt 哈希)
    #[sea_orm(column_type = "String(Some(100))")]
    #[serde(skip_serializing)]
    pub password: String,

    /// 昵称
    #[sea_orm(column_type = "String(Some(30))")]
    pub nickname: String,

    #[sea_orm(column_type = "String(Some(500))", default_value = "")]
    pub remark: String,

    /// 部门编号
    pub dept_id: Option<i64>,

    /// 邮箱 (非空时租户内唯一)
    #[sea_orm(column_type = "String(Some(50))", nullable)]
    pub email: Option<String>,

    /// 手机号 (非空时租户内唯一)
    #[sea_orm(column_type = "String(Some(11))", nullable)]
    pub mobile: Option<String>,

    #[sea_orm(column_type = "String(Some(512))", default_value = "")]
    pub avatar: String,

    /// 状态: 0=开启, 1=关闭
    pub status: i32,

    /// 最后登录 IP
    #[sea_orm(column_type = "String(Some(50))", nullable)]
    pub login_ip: Option<String>,

    /// 最后登录时间
    pub login_date: Option<DateTime>,

    pub creator: Option<i64>,
    pub create_time: DateTime,
    pub update_time: DateTime,
    pub deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 用户响应 (不含密码)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub dept_id: Option<i64>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub avatar: String,
    pub status: i32,
    pub login_ip: Option<String>,
    pub login_date: Option<DateTime>,
    pub create_time: DateTime,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            nickname: model.nickname,
            dept_id: model.dept_id,
            email: model.email,
            mobile: model.mobile,
            avatar: model.avatar,
            status: model.status,
            login_ip: model.login_ip,
            login_date: model.login_date,
            create_time: model.create_time,
        }
    }
}
