//! User listing
//!
//! The page query carries the caller's tenant and data scope, so a user
//! limited to their own rows only ever sees rows they created.

use axum::{
    extract::{Query, State},
    Extension,
};
use sea_orm::{ColumnTrait, QueryFilter, QueryOrder};
use sea_orm::EntityTrait;
use serde::Deserialize;

use crate::auth::LoginUser;
use crate::entity::user::{self, UserResponse};
use crate::permission::{perm, ScopedQuery};
use crate::routes::{fetch_page, success, ApiResult, PageParam, PageResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPageFilter {
    pub username: Option<String>,
    pub mobile: Option<String>,
    pub status: Option<i32>,
    pub dept_id: Option<i64>,
}

/// GET /system/user/page
pub async fn page_users(
    State(state): State<AppState>,
    Extension(login_user): Extension<LoginUser>,
    Query(page): Query<PageParam>,
    Query(filter): Query<UserPageFilter>,
) -> ApiResult<PageResult<UserResponse>> {
    state.perm.check_permission(&login_user, perm::USER_QUERY).await?;
    let scope = state.perm.query_scope(&login_user).await;

    let mut query = user::Entity::find().scoped(&scope);
    if let Some(username) = filter.username.filter(|u| !u.is_empty()) {
        query = query.filter(user::Column::Username.contains(&username));
    }
    if let Some(mobile) = filter.mobile.filter(|m| !m.is_empty()) {
        query = query.filter(user::Column::Mobile.contains(&mobile));
    }
    if let Some(status) = filter.status {
        query = query.filter(user::Column::Status.eq(status));
    }
    if let Some(dept_id) = filter.dept_id {
        query = query.filter(user::Column::DeptId.eq(dept_id));
    }

    let page = fetch_page(&state.db, query.order_by_desc(user::Column::Id), &page).await?;
    success(page.map(UserResponse::from))
}
