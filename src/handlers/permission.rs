//! Permission assignment handlers

use std::collections::BTreeSet;

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::Deserialize;

use crate::auth::LoginUser;
use crate::permission::perm;
use crate::routes::{success, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleMenuRequest {
    pub role_id: i64,
    #[serde(default)]
    pub menu_ids: BTreeSet<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleDataScopeRequest {
    pub role_id: i64,
    pub data_scope: i32,
    #[serde(default)]
    pub data_scope_dept_ids: BTreeSet<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignUserRoleRequest {
    pub user_id: i64,
    #[serde(default)]
    pub role_ids: BTreeSet<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleIdQuery {
    pub role_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdQuery {
    pub user_id: i64,
}

/// POST /system/permission/assign-role-menu
pub async fn assign_role_menu(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<AssignRoleMenuRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::ASSIGN_ROLE_MENU).await?;
    state
        .perm
        .assign_role_menu(user.tenant_id, req.role_id, req.menu_ids)
        .await?;
    success(true)
}

/// POST /system/permission/assign-role-data-scope
pub async fn assign_role_data_scope(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<AssignRoleDataScopeRequest>,
) -> ApiResult<bool> {
    state
        .perm
        .check_permission(&user, perm::ASSIGN_ROLE_DATA_SCOPE)
        .await?;
    state
        .perm
        .assign_role_data_scope(user.tenant_id, req.role_id, req.data_scope, req.data_scope_dept_ids)
        .await?;
    success(true)
}

/// POST /system/permission/assign-user-role
pub async fn assign_user_role(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<AssignUserRoleRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::ASSIGN_USER_ROLE).await?;
    state
        .perm
        .assign_user_role(user.tenant_id, req.user_id, req.role_ids)
        .await?;
    success(true)
}

/// GET /system/permission/list-role-menus?roleId=...
pub async fn list_role_menus(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<RoleIdQuery>,
) -> ApiResult<BTreeSet<i64>> {
    state.perm.check_permission(&user, perm::ASSIGN_ROLE_MENU).await?;
    success(state.perm.list_role_menu_ids(user.tenant_id, query.role_id).await?)
}

/// GET /system/permission/list-user-roles?userId=...
pub async fn list_user_roles(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<UserIdQuery>,
) -> ApiResult<BTreeSet<i64>> {
    state.perm.check_permission(&user, perm::ASSIGN_USER_ROLE).await?;
    success(state.perm.list_user_role_ids(user.tenant_id, query.user_id).await?)
}
