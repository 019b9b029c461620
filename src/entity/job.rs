//! Job entity - 定时任务表
//!
//! 表名: infra_job

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 任务状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// 初始化中
    Init = 0,
    /// 开启
    Running = 1,
    /// 暂停
    Paused = 2,
}

impl TryFrom<i32> for JobStatus {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(JobStatus::Init),
            1 => Ok(JobStatus::Running),
            2 => Ok(JobStatus::Paused),
            other => Err(other),
        }
    }
}

impl From<JobStatus> for i32 {
    fn from(status: JobStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "infra_job")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// 任务名称
    #[sea_orm(column_type = "String(Some(32))")]
    pub name: String,

    /// 任务状态: 0=初始化, 1=开启, 2=暂停
    pub status: i32,

    /// 处理器名字 (唯一)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub handler_name: String,

    /// 处理器参数
    #[sea_orm(column_type = "String(Some(255))", default_value = "")]
    pub handler_param: String,

    /// CRON 表达式
    #[sea_orm(column_type = "String(Some(32))")]
    pub cron_expression: String,

    /// 重试次数
    pub retry_count: i32,

    /// 重试间隔 (毫秒)
    pub retry_interval: i32,

    /// 监控超时时间 (毫秒，0 表示不监控)
    pub monitor_timeout: i32,

    pub create_time: DateTime,
    pub update_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
