//! Tenant and tenant package handlers

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use serde::Deserialize;

use super::IdQuery;
use crate::auth::LoginUser;
use crate::entity::{tenant, tenant_package};
use crate::error::AppError;
use crate::permission::perm;
use crate::permission::tenant::{TenantPackageSaveRequest, TenantSaveRequest};
use crate::routes::{success, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

/// POST /system/tenant/create
pub async fn create_tenant(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<TenantSaveRequest>,
) -> ApiResult<i64> {
    state.perm.check_permission(&user, perm::TENANT_CREATE).await?;
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::param("密码不能为空"))?;
    let hash = state.auth.hash_password(password)?;
    success(state.perm.create_tenant(req, &hash).await?)
}

/// PUT /system/tenant/update
pub async fn update_tenant(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<TenantSaveRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::TENANT_UPDATE).await?;
    state.perm.update_tenant(req).await?;
    success(true)
}

/// DELETE /system/tenant/delete?id=...
pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::TENANT_DELETE).await?;
    state.perm.delete_tenant(query.id).await?;
    success(true)
}

/// GET /system/tenant/get?id=...
pub async fn get_tenant(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<tenant::Model> {
    state.perm.check_permission(&user, perm::TENANT_QUERY).await?;
    success(state.perm.get_tenant(query.id).await?)
}

/// GET /system/tenant/list
pub async fn list_tenants(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
) -> ApiResult<Vec<tenant::Model>> {
    state.perm.check_permission(&user, perm::TENANT_QUERY).await?;
    success(state.perm.list_tenants().await?)
}

/// GET /system/tenant/get-id-by-name?name=...; public, used by the login page
pub async fn get_tenant_id_by_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> ApiResult<Option<i64>> {
    success(state.perm.get_tenant_id_by_name(&query.name).await?)
}

/// POST /system/tenant-package/create
pub async fn create_package(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<TenantPackageSaveRequest>,
) -> ApiResult<i64> {
    state.perm.check_permission(&user, perm::PACKAGE_CREATE).await?;
    success(state.perm.create_tenant_package(req).await?)
}

/// PUT /system/tenant-package/update
pub async fn update_package(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Json(req): Json<TenantPackageSaveRequest>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::PACKAGE_UPDATE).await?;
    state.perm.update_tenant_package(req).await?;
    success(true)
}

/// DELETE /system/tenant-package/delete?id=...
pub async fn delete_package(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<bool> {
    state.perm.check_permission(&user, perm::PACKAGE_DELETE).await?;
    state.perm.delete_tenant_package(query.id).await?;
    success(true)
}

/// GET /system/tenant-package/get?id=...
pub async fn get_package(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
    Query(query): Query<IdQuery>,
) -> ApiResult<tenant_package::Model> {
    state.perm.check_permission(&user, perm::PACKAGE_QUERY).await?;
    success(state.perm.get_tenant_package(query.id).await?)
}

/// GET /system/tenant-package/list
pub async fn list_packages(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
) -> ApiResult<Vec<tenant_package::Model>> {
    state.perm.check_permission(&user, perm::PACKAGE_QUERY).await?;
    success(state.perm.list_tenant_packages().await?)
}
