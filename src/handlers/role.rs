//! Role handlers

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};

use super::{IdQuery, StatusRequest};
use crate::auth::LoginUser;
use crate::entity::role;
use crate::permission::perm;
use crate::permission::role::RoleSaveRequest;
use crate::routes::{success, ApiResult};
use crate::state::AppState;

/// POST /system/role/create
pub async fn create_role(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<RoleSaveRequest>,
) -> ApiResult<i64> {
    state.perm.check_permission(&user, perm::ROLE_CREATE).await?;
    success(state.perm.create_role(user.tenant_id, req).await?)
}

/// PUT /system/role/update
pub async fn update_role(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<RoleSaveRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::ROLE_UPDATE).await?;
    state.perm.update_role(user.tenant_id, req).await?;
    success(true)
}

/// PUT /system/role/update-status
pub async fn update_role_status(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::ROLE_UPDATE).await?;
    state
        .perm
        .update_role_status(user.tenant_id, req.id, req.status)
        .await?;
    success(true)
}

/// DELETE /system/role/delete?id=...
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::ROLE_DELETE).await?;
    state.perm.delete_role(user.tenant_id, query.id).await?;
    success(true)
}

/// GET /system/role/get?id=...
pub async fn get_role(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<role::Model> {
    state.perm.check_permission(&user, perm::ROLE_QUERY).await?;
    success(state.perm.get_role(user.tenant_id, query.id).await?)
}

/// GET /system/role/list
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
) -> ApiResult<Vec<role::Model>> {
    state.perm.check_permission(&user, perm::ROLE_QUERY).await?;
    let scope = state.perm.query_scope(&user).await;
    success(state.perm.list_roles(&scope).await?)
}
