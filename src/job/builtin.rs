//! Bundled job handlers

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use super::handler::{JobContext, JobHandler, JobHandlerRegistry};
use crate::entity::{job_log, login_log, now};
use crate::error::AppResult;

const DEFAULT_RETAIN_DAYS: i64 = 14;

fn retain_days(param: &str) -> anyhow::Result<i64> {
    let param = param.trim();
    if param.is_empty() {
        return Ok(DEFAULT_RETAIN_DAYS);
    }
    let days: i64 = param
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid retention days: {}", param))?;
    anyhow::ensure!(days > 0, "retention days must be positive, got {}", days);
    Ok(days)
}

/// Deletes job logs older than the retention period
pub struct JobLogCleanJob {
    db: DatabaseConnection,
}

#[async_trait]
impl JobHandler for JobLogCleanJob {
    fn name(&self) -> &str {
        "jobLogCleanJob"
    }

    async fn execute(&self, _ctx: JobContext, param: &str) -> anyhow::Result<()> {
        let cutoff = now() - chrono::Duration::days(retain_days(param)?);
        let result = job_log::Entity::delete_many()
            .filter(job_log::Column::CreateTime.lt(cutoff))
            .exec(&self.db)
            .await?;
        tracing::info!("Cleaned {} job logs older than {}", result.rows_affected, cutoff);
        Ok(())
    }
}

/// Deletes login logs older than the retention period
pub struct LoginLogCleanJob {
    db: DatabaseConnection,
}

#[async_trait]
impl JobHandler for LoginLogCleanJob {
    fn name(&self) -> &str {
        "loginLogCleanJob"
    }

    async fn execute(&self, _ctx: JobContext, param: &str) -> anyhow::Result<()> {
        let cutoff = now() - chrono::Duration::days(retain_days(param)?);
        let result = login_log::Entity::delete_many()
            .filter(login_log::Column::CreateTime.lt(cutoff))
            .exec(&self.db)
            .await?;
        tracing::info!("Cleaned {} login logs older than {}", result.rows_affected, cutoff);
        Ok(())
    }
}

/// Registry holding every bundled handler
pub fn builtin_handlers(db: &DatabaseConnection) -> AppResult<JobHandlerRegistry> {
    let mut registry = JobHandlerRegistry::new();
    registry.register(Arc::new(JobLogCleanJob { db: db.clone() }))?;
    registry.register(Arc::new(LoginLogCleanJob { db: db.clone() }))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ActiveModelTrait, PaginatorTrait, Set};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> JobContext {
        JobContext {
            job_id: 1,
            execute_index: 1,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_retain_days() {
        assert_eq!(retain_days("").unwrap(), 14);
        assert_eq!(retain_days(" 3 ").unwrap(), 3);
        assert!(retain_days("abc").is_err());
        assert!(retain_days("0").is_err());
    }

    #[tokio::test]
    async fn test_login_log_clean() {
        let db = crate::testing::memory_db().await;
        for days_ago in [1, 30] {
            login_log::ActiveModel {
                tenant_id: Set(1),
                log_type: Set(100),
                user_id: Set(Some(1)),
                user_type: Set(2),
                username: Set("admin".to_string()),
                result: Set(0),
                user_ip: Set(String::new()),
                user_agent: Set(String::new()),
                create_time: Set(now() - chrono::Duration::days(days_ago)),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let registry = builtin_handlers(&db).unwrap();
        let handler = registry.get("loginLogCleanJob").unwrap();
        handler.execute(ctx(), "7").await.unwrap();
        assert_eq!(login_log::Entity::find().count(&db).await.unwrap(), 1);
        assert!(registry.get("jobLogCleanJob").is_some());
    }
}
