//! Request handlers module

use serde::Deserialize;

pub mod auth;
pub mod job;
pub mod menu;
pub mod notice;
pub mod permission;
pub mod role;
pub mod tenant;
pub mod user;

/// `?id=...`
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: i64,
}

/// Body of the `update-status` endpoints
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub id: i64,
    pub status: i32,
}
