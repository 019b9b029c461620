//! JobLog entity - 定时任务执行日志表
//!
//! 表名: infra_job_log

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 执行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobLogStatus {
    /// 运行中
    Running = 0,
    /// 成功
    Success = 1,
    /// 失败
    Failure = 2,
}

impl From<JobLogStatus> for i32 {
    fn from(status: JobLogStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "infra_job_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 任务编号
    pub job_id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub handler_name: String,

    #[sea_orm(column_type = "String(Some(255))", default_value = "")]
    pub handler_param: String,

    /// 第几次执行 (从 1 开始，重试递增)
    pub execute_index: i32,

    pub begin_time: DateTime,
    pub end_time: Option<DateTime>,

    /// 执行时长 (毫秒)
    pub duration: Option<i64>,

    /// 状态: 0=运行中, 1=成功, 2=失败
    pub status: i32,

    /// 结果数据
    #[sea_orm(column_type = "String(Some(4000))", nullable)]
    pub result: Option<String>,

    pub create_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
