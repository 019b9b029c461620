//! Menu handlers

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::Deserialize;

use super::IdQuery;
use crate::auth::LoginUser;
use crate::entity::menu;
use crate::permission::menus::MenuSaveRequest;
use crate::permission::perm;
use crate::routes::{success, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuListQuery {
    /// Only enabled menus, as used by the role assignment dialog
    #[serde(default)]
    pub enabled_only: bool,
}

/// POST /system/menu/create
pub async fn create_menu(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<MenuSaveRequest>,
) -> ApiResult<i64> {
    state.perm.check_permission(&user, perm::MENU_CREATE).await?;
    success(state.perm.create_menu(req).await?)
}

/// PUT /system/menu/update
pub async fn update_menu(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<MenuSaveRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::MENU_UPDATE).await?;
    state.perm.update_menu(req).await?;
    success(true)
}

/// DELETE /system/menu/delete?id=...
pub async fn delete_menu(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::MENU_DELETE).await?;
    state.perm.delete_menu(query.id).await?;
    success(true)
}

/// GET /system/menu/get?id=...
pub async fn get_menu(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<menu::Model> {
    state.perm.check_permission(&user, perm::MENU_QUERY).await?;
    success(state.perm.get_menu(query.id).await?)
}

/// GET /system/menu/list; limited to the caller's tenant package
pub async fn list_menus(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<MenuListQuery>,
) -> ApiResult<Vec<menu::Model>> {
    state.perm.check_permission(&user, perm::MENU_QUERY).await?;
    success(state.perm.list_menus(user.tenant_id, query.enabled_only).await?)
}
