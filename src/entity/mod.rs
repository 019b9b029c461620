//! Entity module - SeaORM 实体定义
//!
//! 包含所有数据库表对应的实体模型

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub mod dept;
pub mod job;
pub mod job_log;
pub mod login_log;
pub mod menu;
pub mod role;
pub mod role_menu;
pub mod social_user;
pub mod social_user_bind;
pub mod tenant;
pub mod tenant_package;
pub mod user;
pub mod user_role;

/// 通用状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommonStatus {
    /// 开启
    Enable = 0,
    /// 关闭
    Disable = 1,
}

impl From<i32> for CommonStatus {
    fn from(value: i32) -> Self {
        match value {
            0 => CommonStatus::Enable,
            _ => CommonStatus::Disable,
        }
    }
}

impl From<CommonStatus> for i32 {
    fn from(status: CommonStatus) -> Self {
        status as i32
    }
}

impl CommonStatus {
    pub fn is_enable(value: i32) -> bool {
        CommonStatus::from(value) == CommonStatus::Enable
    }
}

/// 解析 JSON 数组形式存储的编号集合，格式错误时视为空集合
pub fn parse_id_set(raw: &str) -> BTreeSet<i64> {
    if raw.trim().is_empty() {
        return BTreeSet::new();
    }
    serde_json::from_str::<Vec<i64>>(raw)
        .map(|ids| ids.into_iter().collect())
        .unwrap_or_else(|e| {
            tracing::warn!("Malformed id set {:?}: {}", raw, e);
            BTreeSet::new()
        })
}

/// 编号集合序列化为 JSON 数组
pub fn format_id_set<'a>(ids: impl IntoIterator<Item = &'a i64>) -> String {
    let ids: Vec<i64> = ids.into_iter().copied().collect();
    serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
}

/// 当前本地时间
pub fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_set_roundtrip() {
        let ids: BTreeSet<i64> = [3, 1, 2].into_iter().collect();
        let raw = format_id_set(&ids);
        assert_eq!(raw, "[1,2,3]");
        assert_eq!(parse_id_set(&raw), ids);
    }

    #[test]
    fn test_id_set_tolerates_garbage() {
        assert!(parse_id_set("").is_empty());
        assert!(parse_id_set("not json").is_empty());
    }

    #[test]
    fn test_common_status() {
        assert!(CommonStatus::is_enable(0));
        assert!(!CommonStatus::is_enable(1));
        assert_eq!(i32::from(CommonStatus::Disable), 1);
    }
}
