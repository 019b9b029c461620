//! Yudao Admin - a multi-tenant administrative backend
//!
//! This crate provides login and token management, role based access control
//! clipped by tenant packages and data scopes, cron-driven jobs with execution
//! logs, and WebSocket push to logged-in users.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod job;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod state;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
