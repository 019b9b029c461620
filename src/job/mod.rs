//! Cron-driven job scheduler

pub mod builtin;
pub mod handler;
pub mod scheduler;
pub mod service;

pub use builtin::builtin_handlers;
pub use handler::{JobContext, JobHandler, JobHandlerRegistry};
pub use scheduler::{next_times, parse_cron, JobScheduler};
pub use service::JobService;
