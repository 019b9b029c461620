//! Scheduled job handlers

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use chrono::NaiveDateTime;
use serde::Deserialize;

use super::{IdQuery, StatusRequest};
use crate::auth::LoginUser;
use crate::entity::{job, job_log};
use crate::job::service::{JobLogPageFilter, JobPageFilter, JobSaveRequest};
use crate::permission::perm;
use crate::routes::{success, ApiResult, PageParam, PageResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NextTimesQuery {
    pub id: i64,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    5
}

/// POST /infra/job/create
pub async fn create_job(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<JobSaveRequest>,
) -> ApiResult<i64> {
    state.perm.check_permission(&user, perm::JOB_CREATE).await?;
    success(state.jobs.create(req).await?)
}

/// PUT /infra/job/update
pub async fn update_job(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<JobSaveRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::JOB_UPDATE).await?;
    state.jobs.update(req).await?;
    success(true)
}

/// PUT /infra/job/update-status?id=...&status=...
pub async fn update_job_status(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<StatusRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::JOB_UPDATE).await?;
    state.jobs.update_status(query.id, query.status).await?;
    success(true)
}

/// DELETE /infra/job/delete?id=...
pub async fn delete_job(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::JOB_DELETE).await?;
    state.jobs.delete(query.id).await?;
    success(true)
}

/// PUT /infra/job/trigger?id=...
pub async fn trigger_job(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::JOB_TRIGGER).await?;
    state.jobs.trigger(query.id).await?;
    success(true)
}

/// POST /infra/job/sync
pub async fn sync_jobs(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
) -> ApiResult<usize> {
    state.perm.check_permission(&user, perm::JOB_CREATE).await?;
    success(state.jobs.sync().await?)
}

/// GET /infra/job/get?id=...
pub async fn get_job(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<job::Model> {
    state.perm.check_permission(&user, perm::JOB_QUERY).await?;
    success(state.jobs.get(query.id).await?)
}

/// GET /infra/job/page
pub async fn page_jobs(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(page): Query<PageParam>,
    Query(filter): Query<JobPageFilter>,
) -> ApiResult<PageResult<job::Model>> {
    state.perm.check_permission(&user, perm::JOB_QUERY).await?;
    success(state.jobs.page(filter, page).await?)
}

/// GET /infra/job/get_next_times?id=...&count=...
pub async fn get_next_times(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<NextTimesQuery>,
) -> ApiResult<Vec<NaiveDateTime>> {
    state.perm.check_permission(&user, perm::JOB_QUERY).await?;
    success(state.jobs.next_times(query.id, query.count).await?)
}

/// GET /infra/job-log/get?id=...
pub async fn get_job_log(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<job_log::Model> {
    state.perm.check_permission(&user, perm::JOB_QUERY).await?;
    success(state.jobs.get_log(query.id).await?)
}

/// GET /infra/job-log/page
pub async fn page_job_logs(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(page): Query<PageParam>,
    Query(filter): Query<JobLogPageFilter>,
) -> ApiResult<PageResult<job_log::Model>> {
    state.perm.check_permission(&user, perm::JOB_QUERY).await?;
    success(state.jobs.page_logs(filter, page).await?)
}
