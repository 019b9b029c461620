//! In-memory cron scheduler
//!
//! Every scheduled job owns a tokio task that sleeps until the next fire time
//! of its cron schedule. Each execution attempt writes exactly one job log
//! row; retries reuse the job and increment `executeIndex`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use cron::Schedule;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::{JobContext, JobHandler, JobHandlerRegistry};
use crate::entity::job_log::{self, JobLogStatus};
use crate::entity::{job, now};
use crate::error::{AppError, AppResult};

/// Longest result text stored on a job log
const MAX_RESULT_LEN: usize = 4000;

const TIMEOUT_MESSAGE: &str = "任务执行超时";

/// Parse a 5-field, 6-field (leading seconds) or descriptor cron expression
pub fn parse_cron(expr: &str) -> AppResult<Schedule> {
    let expr = expr.trim();
    let invalid = || AppError::param(format!("无效的 cron 表达式: {}", expr));
    if expr.is_empty() {
        return Err(invalid());
    }
    let normalized = if expr.starts_with('@') {
        expr.to_string()
    } else {
        match expr.split_whitespace().count() {
            5 => format!("0 {}", expr),
            6 | 7 => expr.to_string(),
            _ => return Err(invalid()),
        }
    };
    Schedule::from_str(&normalized).map_err(|e| {
        debug!("Cron expression {:?} rejected: {}", expr, e);
        invalid()
    })
}

/// Next `count` fire times of the expression
pub fn next_times(expr: &str, count: usize) -> AppResult<Vec<NaiveDateTime>> {
    let schedule = parse_cron(expr)?;
    Ok(schedule
        .upcoming(Local)
        .take(count)
        .map(|t| t.naive_local())
        .collect())
}

/// Runs job attempts and records their logs
pub struct JobExecutor {
    db: DatabaseConnection,
    handlers: JobHandlerRegistry,
    shutdown: CancellationToken,
}

impl JobExecutor {
    /// Run the job with retries; returns the status of the final attempt
    pub async fn execute(&self, job: &job::Model) -> JobLogStatus {
        let Some(handler) = self.handlers.get(&job.handler_name) else {
            warn!("Job {} references unknown handler {}", job.id, job.handler_name);
            return JobLogStatus::Failure;
        };

        let attempts = job.retry_count.max(0) + 1;
        let mut status = JobLogStatus::Failure;
        for execute_index in 1..=attempts {
            status = self.execute_once(handler.clone(), job, execute_index).await;
            if status == JobLogStatus::Success || self.shutdown.is_cancelled() {
                break;
            }
            if execute_index < attempts && job.retry_interval > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(job.retry_interval as u64)) => {}
                    _ = self.shutdown.cancelled() => break,
                }
            }
        }
        status
    }

    async fn execute_once(
        &self,
        handler: Arc<dyn JobHandler>,
        job: &job::Model,
        execute_index: i32,
    ) -> JobLogStatus {
        let begin_time = now();
        let started = Instant::now();
        let log = job_log::ActiveModel {
            job_id: Set(job.id),
            handler_name: Set(job.handler_name.clone()),
            handler_param: Set(job.handler_param.clone()),
            execute_index: Set(execute_index),
            begin_time: Set(begin_time),
            status: Set(JobLogStatus::Running.into()),
            create_time: Set(begin_time),
            ..Default::default()
        }
        .insert(&self.db)
        .await;
        let log = match log {
            Ok(log) => Some(log),
            Err(e) => {
                error!("Failed to create log for job {}: {}", job.id, e);
                None
            }
        };

        let cancel = self.shutdown.child_token();
        let ctx = JobContext {
            job_id: job.id,
            execute_index,
            cancel: cancel.clone(),
        };
        let param = job.handler_param.clone();
        let mut task = tokio::spawn(async move { handler.execute(ctx, &param).await });

        let outcome = if job.monitor_timeout > 0 {
            let limit = Duration::from_millis(job.monitor_timeout as u64);
            match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => flatten(joined),
                Err(_) => {
                    cancel.cancel();
                    task.abort();
                    Err(TIMEOUT_MESSAGE.to_string())
                }
            }
        } else {
            flatten(task.await)
        };

        let duration = started.elapsed().as_millis() as i64;
        let (status, result) = match outcome {
            Ok(()) => (JobLogStatus::Success, "success".to_string()),
            Err(message) => {
                warn!(
                    "Job {} ({}) attempt {} failed: {}",
                    job.id, job.handler_name, execute_index, message
                );
                (JobLogStatus::Failure, truncate(message))
            }
        };
        debug!(
            "Job {} attempt {} finished in {}ms: {:?}",
            job.id, execute_index, duration, status
        );

        if let Some(log) = log {
            let mut active: job_log::ActiveModel = log.into();
            active.end_time = Set(Some(now()));
            active.duration = Set(Some(duration));
            active.status = Set(status.into());
            active.result = Set(Some(result));
            if let Err(e) = active.update(&self.db).await {
                error!("Failed to update log for job {}: {}", job.id, e);
            }
        }
        status
    }
}

fn flatten(joined: Result<anyhow::Result<()>, tokio::task::JoinError>) -> Result<(), String> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(e) if e.is_panic() => Err("任务执行异常: handler panicked".to_string()),
        Err(e) => Err(format!("任务执行异常: {}", e)),
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_RESULT_LEN {
        let mut end = MAX_RESULT_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

struct ScheduledEntry {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cron scheduler over the registered handlers
pub struct JobScheduler {
    executor: Arc<JobExecutor>,
    entries: Mutex<HashMap<i64, ScheduledEntry>>,
}

impl JobScheduler {
    pub fn new(db: DatabaseConnection, handlers: JobHandlerRegistry) -> Self {
        Self {
            executor: Arc::new(JobExecutor {
                db,
                handlers,
                shutdown: CancellationToken::new(),
            }),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn handlers(&self) -> &JobHandlerRegistry {
        &self.executor.handlers
    }

    /// Check handler and cron expression without scheduling anything
    pub fn validate(&self, handler_name: &str, cron_expression: &str) -> AppResult<Schedule> {
        let schedule = parse_cron(cron_expression)?;
        self.executor.handlers.require(handler_name)?;
        Ok(schedule)
    }

    /// Schedule the job; a job that is already scheduled is left as-is
    pub async fn add_job(&self, job: &job::Model) -> AppResult<()> {
        let schedule = self.validate(&job.handler_name, &job.cron_expression)?;
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&job.id) {
            debug!("Job {} already scheduled", job.id);
            return Ok(());
        }

        let cancel = self.executor.shutdown.child_token();
        let handle = tokio::spawn(run_schedule(
            self.executor.clone(),
            job.clone(),
            schedule,
            cancel.clone(),
        ));
        entries.insert(job.id, ScheduledEntry { cancel, handle });
        info!(
            "Job scheduled: {} ({}) [{}]",
            job.name, job.id, job.cron_expression
        );
        Ok(())
    }

    /// Stop future fires of the job; running executions finish
    pub async fn remove_job(&self, job_id: i64) -> bool {
        let removed = self.entries.lock().await.remove(&job_id);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!("Job unscheduled: {}", job_id);
                true
            }
            None => false,
        }
    }

    /// Replace the schedule of a job with its current definition
    pub async fn reschedule(&self, job: &job::Model) -> AppResult<()> {
        self.validate(&job.handler_name, &job.cron_expression)?;
        self.remove_job(job.id).await;
        self.add_job(job).await
    }

    /// One immediate execution outside the schedule
    pub fn trigger(&self, job: &job::Model) -> AppResult<()> {
        self.executor.handlers.require(&job.handler_name)?;
        let executor = self.executor.clone();
        let job = job.clone();
        info!("Job triggered: {} ({})", job.name, job.id);
        tokio::spawn(async move {
            executor.execute(&job).await;
        });
        Ok(())
    }

    pub async fn contains(&self, job_id: i64) -> bool {
        self.entries.lock().await.contains_key(&job_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cancel every schedule and running execution
    pub async fn shutdown(&self) {
        self.executor.shutdown.cancel();
        let entries: Vec<ScheduledEntry> = self.entries.lock().await.drain().map(|(_, e)| e).collect();
        for entry in entries {
            if let Err(e) = entry.handle.await {
                warn!("Job schedule task ended abnormally: {}", e);
            }
        }
        info!("Job scheduler stopped");
    }
}

async fn run_schedule(
    executor: Arc<JobExecutor>,
    job: job::Model,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    let running = Arc::new(AtomicBool::new(false));
    let mut cursor = Local::now();
    loop {
        let Some(next) = schedule.after(&cursor).next() else {
            debug!("Job {} has no further fire times", job.id);
            break;
        };
        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        cursor = next;

        // singleton: skip while the previous scheduled run is in progress
        if running.swap(true, Ordering::AcqRel) {
            debug!("Job {} still running, fire at {} skipped", job.id, next);
            continue;
        }
        let executor = executor.clone();
        let running = running.clone();
        let job = job.clone();
        tokio::spawn(async move {
            executor.execute(&job).await;
            running.store(false, Ordering::Release);
        });
    }
}
