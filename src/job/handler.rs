//! Job handlers and their registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Execution context handed to a handler
#[derive(Clone, Debug)]
pub struct JobContext {
    pub job_id: i64,
    /// 1 for the first attempt, incremented on every retry
    pub execute_index: i32,
    /// Cancelled when the monitor timeout is exceeded or the scheduler stops
    pub cancel: CancellationToken,
}

/// A unit of work a job can run
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Name referenced by `handlerName` on the job
    fn name(&self) -> &str;

    async fn execute(&self, ctx: JobContext, param: &str) -> anyhow::Result<()>;
}

/// Name to handler map, filled at startup and read-only afterwards
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> AppResult<()> {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(AppError::conflict(format!("任务处理器 {} 已经注册", name)));
        }
        tracing::debug!("Job handler registered: {}", name);
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Lookup that fails with PARAM listing the registered handlers
    pub fn require(&self, name: &str) -> AppResult<Arc<dyn JobHandler>> {
        self.get(name).ok_or_else(|| {
            AppError::param(format!(
                "未找到任务处理器 {}，已注册的处理器: [{}]",
                name,
                self.names().join(", ")
            ))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Handler that sleeps, then succeeds, fails or panics depending on the param
    pub(crate) struct ScriptedJob {
        pub name: String,
        pub calls: AtomicUsize,
    }

    impl ScriptedJob {
        pub fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedJob {
        fn name(&self) -> &str {
            &self.name
        }

        /// `param` is `<sleep ms>[:fail|:panic|:fail-first]`
        async fn execute(&self, ctx: JobContext, param: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (sleep, mode) = param.split_once(':').unwrap_or((param, ""));
            let sleep: u64 = sleep.parse().unwrap_or(0);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(sleep)) => {}
                _ = ctx.cancel.cancelled() => anyhow::bail!("cancelled"),
            }
            match mode {
                "fail" => anyhow::bail!("scripted failure"),
                "fail-first" if ctx.execute_index == 1 => anyhow::bail!("first attempt fails"),
                "panic" => panic!("scripted panic"),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = JobHandlerRegistry::new();
        registry.register(ScriptedJob::new("demoJob")).unwrap();
        assert!(registry.register(ScriptedJob::new("demoJob")).is_err());
        registry.register(ScriptedJob::new("anotherJob")).unwrap();
        assert_eq!(registry.names(), vec!["anotherJob", "demoJob"]);
    }

    #[test]
    fn test_require_lists_handlers() {
        let mut registry = JobHandlerRegistry::new();
        registry.register(ScriptedJob::new("demoJob")).unwrap();
        let err = registry.require("missing").err().unwrap();
        assert!(err.to_string().contains("demoJob"), "{}", err);
    }
}
