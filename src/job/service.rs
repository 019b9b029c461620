//! Job definitions and their lifecycle

use std::sync::Arc;

use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::scheduler::{next_times, JobScheduler};
use crate::entity::job::{self, JobStatus};
use crate::entity::{job_log, now};
use crate::error::{AppError, AppResult, OptionExt};
use crate::routes::{fetch_page, PageParam, PageResult};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSaveRequest {
    pub id: Option<i64>,
    pub name: String,
    pub handler_name: String,
    #[serde(default)]
    pub handler_param: String,
    pub cron_expression: String,
    #[serde(default)]
    pub retry_count: i32,
    /// Milliseconds between attempts
    #[serde(default)]
    pub retry_interval: i32,
    /// Milliseconds, 0 disables the monitor
    #[serde(default)]
    pub monitor_timeout: i32,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPageFilter {
    pub name: Option<String>,
    pub status: Option<i32>,
    pub handler_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogPageFilter {
    pub job_id: Option<i64>,
    pub handler_name: Option<String>,
    pub status: Option<i32>,
}

pub struct JobService {
    db: DatabaseConnection,
    scheduler: Arc<JobScheduler>,
}

impl JobService {
    pub fn new(db: DatabaseConnection, scheduler: Arc<JobScheduler>) -> Self {
        Self { db, scheduler }
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    fn validate_request(&self, req: &JobSaveRequest) -> AppResult<()> {
        if req.name.trim().is_empty() {
            return Err(AppError::param("任务名称不能为空"));
        }
        if req.retry_count < 0 || req.retry_interval < 0 || req.monitor_timeout < 0 {
            return Err(AppError::param("重试次数、重试间隔和监控超时不能为负数"));
        }
        self.scheduler
            .validate(&req.handler_name, &req.cron_expression)?;
        Ok(())
    }

    /// Persist as init, schedule, then mark running, all in one transaction
    pub async fn create(&self, req: JobSaveRequest) -> AppResult<i64> {
        self.validate_request(&req)?;
        let exists = job::Entity::find()
            .filter(job::Column::HandlerName.eq(req.handler_name.as_str()))
            .count(&self.db)
            .await?;
        if exists > 0 {
            return Err(AppError::conflict("定时任务的处理器已经存在"));
        }

        let now = now();
        let txn = self.db.begin().await?;
        let job = job::ActiveModel {
            name: Set(req.name),
            status: Set(JobStatus::Init.into()),
            handler_name: Set(req.handler_name),
            handler_param: Set(req.handler_param),
            cron_expression: Set(req.cron_expression),
            retry_count: Set(req.retry_count),
            retry_interval: Set(req.retry_interval),
            monitor_timeout: Set(req.monitor_timeout),
            create_time: Set(now),
            update_time: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        self.scheduler.add_job(&job).await?;
        let job_id = job.id;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(JobStatus::Running.into());
        let finished = match active.update(&txn).await {
            Ok(_) => txn.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = finished {
            self.scheduler.remove_job(job_id).await;
            return Err(e.into());
        }

        info!("Job created: {}", job_id);
        Ok(job_id)
    }

    /// Update definition; running jobs pick up the new schedule
    pub async fn update(&self, req: JobSaveRequest) -> AppResult<()> {
        let id = req.id.ok_or_else(|| AppError::param("任务编号不能为空"))?;
        let current = self.get(id).await?;
        let req = JobSaveRequest {
            handler_name: current.handler_name.clone(),
            ..req
        };
        self.validate_request(&req)?;

        let status = current.status;
        let mut active: job::ActiveModel = current.into();
        active.name = Set(req.name);
        active.handler_param = Set(req.handler_param);
        active.cron_expression = Set(req.cron_expression);
        active.retry_count = Set(req.retry_count);
        active.retry_interval = Set(req.retry_interval);
        active.monitor_timeout = Set(req.monitor_timeout);
        active.update_time = Set(now());
        let job = active.update(&self.db).await?;

        if JobStatus::try_from(status) == Ok(JobStatus::Running) {
            self.scheduler.reschedule(&job).await?;
        }
        Ok(())
    }

    /// Pause or resume
    pub async fn update_status(&self, id: i64, status: i32) -> AppResult<()> {
        let target = match JobStatus::try_from(status) {
            Ok(s @ (JobStatus::Running | JobStatus::Paused)) => s,
            _ => return Err(AppError::param("更新的状态不正确")),
        };
        let job = self.get(id).await?;
        if job.status == i32::from(target) {
            return Err(AppError::conflict("定时任务已经处于该状态，无需修改"));
        }

        // the status change is only committed once the scheduler agrees
        let txn = self.db.begin().await?;
        let mut active: job::ActiveModel = job.into();
        active.status = Set(target.into());
        active.update_time = Set(now());
        let job = active.update(&txn).await?;

        match target {
            JobStatus::Running => {
                self.scheduler.add_job(&job).await?;
                if let Err(e) = txn.commit().await {
                    self.scheduler.remove_job(job.id).await;
                    return Err(e.into());
                }
            }
            _ => {
                txn.commit().await?;
                self.scheduler.remove_job(job.id).await;
            }
        }
        info!("Job {} status changed to {:?}", job.id, target);
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let job = self.get(id).await?;
        self.scheduler.remove_job(job.id).await;
        job::Entity::delete_by_id(job.id).exec(&self.db).await?;
        info!("Job deleted: {}", id);
        Ok(())
    }

    /// One immediate execution; status and schedule are untouched
    pub async fn trigger(&self, id: i64) -> AppResult<()> {
        let job = self.get(id).await?;
        self.scheduler.trigger(&job)
    }

    /// Schedule every running job; returns the number of jobs scheduled
    pub async fn sync(&self) -> AppResult<usize> {
        let jobs = job::Entity::find()
            .filter(job::Column::Status.eq(i32::from(JobStatus::Running)))
            .all(&self.db)
            .await?;
        let mut scheduled = 0;
        for job in &jobs {
            match self.scheduler.add_job(job).await {
                Ok(()) => scheduled += 1,
                Err(e) => warn!("Job {} ({}) not scheduled: {}", job.id, job.handler_name, e),
            }
        }
        info!("Job sync finished: {}/{} scheduled", scheduled, jobs.len());
        Ok(scheduled)
    }

    pub async fn get(&self, id: i64) -> AppResult<job::Model> {
        job::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_not_found("定时任务不存在")
    }

    pub async fn page(&self, filter: JobPageFilter, page: PageParam) -> AppResult<PageResult<job::Model>> {
        let mut query = job::Entity::find();
        if let Some(name) = filter.name.filter(|n| !n.is_empty()) {
            query = query.filter(job::Column::Name.contains(name.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(job::Column::Status.eq(status));
        }
        if let Some(handler) = filter.handler_name.filter(|h| !h.is_empty()) {
            query = query.filter(job::Column::HandlerName.contains(handler.as_str()));
        }
        fetch_page(&self.db, query.order_by_desc(job::Column::Id), &page).await
    }

    pub async fn next_times(&self, id: i64, count: usize) -> AppResult<Vec<NaiveDateTime>> {
        let job = self.get(id).await?;
        next_times(&job.cron_expression, count.clamp(1, 100))
    }

    pub async fn get_log(&self, id: i64) -> AppResult<job_log::Model> {
        job_log::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_not_found("定时任务日志不存在")
    }

    pub async fn page_logs(
        &self,
        filter: JobLogPageFilter,
        page: PageParam,
    ) -> AppResult<PageResult<job_log::Model>> {
        let mut query = job_log::Entity::find();
        if let Some(job_id) = filter.job_id {
            query = query.filter(job_log::Column::JobId.eq(job_id));
        }
        if let Some(handler) = filter.handler_name.filter(|h| !h.is_empty()) {
            query = query.filter(job_log::Column::HandlerName.contains(handler.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(job_log::Column::Status.eq(status));
        }
        fetch_page(&self.db, query.order_by_desc(job_log::Column::Id), &page).await
    }
}
