use axum::{extract::State, response::Json};
use sea_orm::ConnectionTrait;
use serde::Serialize;

use super::CommonResult;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub database: bool,
    pub ws_sessions: usize,
    pub scheduled_jobs: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<CommonResult<HealthStatus>> {
    let database = state
        .db
        .execute_unprepared("SELECT 1")
        .await
        .map_err(|e| tracing::warn!("Health check query failed: {}", e))
        .is_ok();
    Json(CommonResult::success(HealthStatus {
        status: if database { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        ws_sessions: state.ws.len().await,
        scheduled_jobs: state.jobs.scheduler().len().await,
    }))
}
