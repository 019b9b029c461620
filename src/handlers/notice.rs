//! Notice push

use axum::{extract::State, response::Json, Extension};
use serde::{Deserialize, Serialize};

use crate::auth::{LoginUser, UserType};
use crate::error::AppError;
use crate::permission::perm;
use crate::routes::{success, ApiResult};
use crate::state::AppState;
use crate::ws::WsMessage;

pub const NOTICE_PUSH: &str = "notice-push";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticePushRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub notice_type: i32,
}

/// POST /system/notice/push; returns the number of sessions reached
pub async fn push_notice(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<NoticePushRequest>,
) -> ApiResult<usize> {
    state.perm.check_permission(&user, perm::NOTICE_UPDATE).await?;
    if req.title.trim().is_empty() {
        return Err(AppError::param("公告标题不能为空"));
    }
    let message = WsMessage::new(NOTICE_PUSH, &req)?;
    let delivered = state
        .ws
        .broadcast_in_tenant_by_user_type(user.tenant_id, UserType::Admin, &message.to_text())
        .await;
    tracing::info!("Notice \"{}\" pushed to {} sessions", req.title, delivered);
    success(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::ws::registry::tests::{session, session_in};

    #[tokio::test]
    async fn test_push_reaches_own_tenant_admins_only() {
        let state = testing::test_state().await;
        let (admin, mut rx_admin) = session(testing::ADMIN_USER_ID, UserType::Admin, false);
        let (member, mut rx_member) = session(99, UserType::Member, false);
        let (other_tenant, mut rx_other) = session_in(2, 50, UserType::Admin, false);
        state.ws.add(admin.clone()).await;
        state.ws.add(member).await;
        state.ws.add(other_tenant).await;

        let Json(result) = push_notice(
            State(state.clone()),
            Extension(admin.user.clone()),
            Json(NoticePushRequest {
                title: "维护通知".to_string(),
                content: "今晚停机".to_string(),
                notice_type: 1,
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.data, Some(1));

        let frame: serde_json::Value = serde_json::from_str(&rx_admin.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], NOTICE_PUSH);
        assert_eq!(frame["content"]["title"], "维护通知");
        assert!(rx_member.try_recv().is_err());
        assert!(rx_other.try_recv().is_err());
    }
}
