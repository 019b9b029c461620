//! Tenants and tenant packages
//!
//! A package bounds the menus a tenant's roles may grant. Changing a
//! package's menus, or moving a tenant to another package, projects the new
//! menu set onto every role of the affected tenants.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::info;

use super::data_scope::DataScope;
use super::role::insert_role;
use super::service::{list_role_menu_ids, set_role_menus};
use super::PermissionService;
use crate::entity::role::{RoleType, CODE_TENANT_ADMIN};
use crate::entity::{
    format_id_set, now, tenant, tenant_package, user, user_role, CommonStatus,
};
use crate::error::{AppError, AppResult, OptionExt};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPackageSaveRequest {
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub menu_ids: BTreeSet<i64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSaveRequest {
    pub id: Option<i64>,
    pub name: String,
    pub contact_name: String,
    pub contact_mobile: Option<String>,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub websites: Vec<String>,
    pub package_id: i64,
    pub expire_time: NaiveDateTime,
    #[serde(default)]
    pub account_count: i32,
    /// Admin account created with the tenant
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Menus the tenant's package allows; `None` for the system tenant
pub(crate) async fn package_menu_ids<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
) -> AppResult<Option<BTreeSet<i64>>> {
    let tenant = tenant::Entity::find_by_id(tenant_id)
        .filter(tenant::Column::Deleted.eq(false))
        .one(conn)
        .await?
        .ok_or_not_found("租户不存在")?;
    if tenant.is_system() {
        return Ok(None);
    }
    let package = tenant_package::Entity::find_by_id(tenant.package_id)
        .filter(tenant_package::Column::Deleted.eq(false))
        .one(conn)
        .await?;
    Ok(Some(package.map(|p| p.menu_id_set()).unwrap_or_default()))
}

/// Rewrite every role of the tenant against the package menus.
///
/// `tenant_admin` roles receive the full set, other roles keep the part of
/// their current set that is still inside it.
pub(crate) async fn project_package_menus<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
    package_menus: &BTreeSet<i64>,
) -> AppResult<()> {
    let roles = crate::entity::role::Entity::find()
        .filter(crate::entity::role::Column::TenantId.eq(tenant_id))
        .filter(crate::entity::role::Column::Deleted.eq(false))
        .all(conn)
        .await?;

    for role in roles {
        let current = list_role_menu_ids(conn, role.id).await?;
        let target: BTreeSet<i64> = if role.is_tenant_admin() {
            package_menus.clone()
        } else {
            current.intersection(package_menus).copied().collect()
        };
        if target != current {
            set_role_menus(conn, tenant_id, role.id, &target).await?;
        }
    }
    Ok(())
}

impl PermissionService {
    pub async fn create_tenant_package(&self, req: TenantPackageSaveRequest) -> AppResult<i64> {
        self.validate_package_name_unique(None, &req.name).await?;
        let now = now();
        let package = tenant_package::ActiveModel {
            name: Set(req.name),
            status: Set(req.status),
            remark: Set(req.remark),
            menu_ids: Set(format_id_set(&req.menu_ids)),
            create_time: Set(now),
            update_time: Set(now),
            deleted: Set(false),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        info!("Tenant package created: {} ({})", package.name, package.id);
        Ok(package.id)
    }

    pub async fn update_tenant_package(&self, req: TenantPackageSaveRequest) -> AppResult<()> {
        let id = req.id.ok_or_else(|| AppError::param("套餐编号不能为空"))?;
        let package = self.get_tenant_package(id).await?;
        self.validate_package_name_unique(Some(id), &req.name).await?;

        let menus_changed = package.menu_id_set() != req.menu_ids;
        let tenants = if menus_changed {
            tenant::Entity::find()
                .filter(tenant::Column::PackageId.eq(id))
                .filter(tenant::Column::Deleted.eq(false))
                .all(&self.db)
                .await?
        } else {
            Vec::new()
        };

        let txn = self.db.begin().await?;
        let mut active: tenant_package::ActiveModel = package.into();
        active.name = Set(req.name);
        active.status = Set(req.status);
        active.remark = Set(req.remark);
        active.menu_ids = Set(format_id_set(&req.menu_ids));
        active.update_time = Set(now());
        active.update(&txn).await?;
        for tenant in &tenants {
            project_package_menus(&txn, tenant.id, &req.menu_ids).await?;
        }
        txn.commit().await?;

        if menus_changed {
            info!(
                "Tenant package {} menus changed, projected onto {} tenants",
                id,
                tenants.len()
            );
            self.invalidate().await?;
        }
        Ok(())
    }

    pub async fn delete_tenant_package(&self, id: i64) -> AppResult<()> {
        let package = self.get_tenant_package(id).await?;
        let in_use = tenant::Entity::find()
            .filter(tenant::Column::PackageId.eq(id))
            .filter(tenant::Column::Deleted.eq(false))
            .count(&self.db)
            .await?;
        if in_use > 0 {
            return Err(AppError::conflict("租户套餐正在使用中"));
        }
        let mut active: tenant_package::ActiveModel = package.into();
        active.deleted = Set(true);
        active.update_time = Set(now());
        active.update(&self.db).await?;
        Ok(())
    }

    pub async fn get_tenant_package(&self, id: i64) -> AppResult<tenant_package::Model> {
        tenant_package::Entity::find_by_id(id)
            .filter(tenant_package::Column::Deleted.eq(false))
            .one(&self.db)
            .await?
            .ok_or_not_found("租户套餐不存在")
    }

    pub async fn list_tenant_packages(&self) -> AppResult<Vec<tenant_package::Model>> {
        Ok(tenant_package::Entity::find()
            .filter(tenant_package::Column::Deleted.eq(false))
            .order_by_asc(tenant_package::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn validate_package_name_unique(&self, id: Option<i64>, name: &str) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::param("套餐名不能为空"));
        }
        let existing = tenant_package::Entity::find()
            .filter(tenant_package::Column::Name.eq(name))
            .filter(tenant_package::Column::Deleted.eq(false))
            .one(&self.db)
            .await?;
        match existing {
            Some(p) if Some(p.id) != id => Err(AppError::conflict("已经存在该名字的租户套餐")),
            _ => Ok(()),
        }
    }

    /// Package must exist and be enabled before a tenant is placed on it
    async fn validate_package_for_tenant(&self, package_id: i64) -> AppResult<tenant_package::Model> {
        let package = self.get_tenant_package(package_id).await?;
        if !CommonStatus::is_enable(package.status) {
            return Err(AppError::conflict(format!(
                "名字为【{}】的租户套餐已被禁用",
                package.name
            )));
        }
        Ok(package)
    }

    async fn validate_tenant_unique(&self, id: Option<i64>, name: &str, websites: &[String]) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::param("租户名不能为空"));
        }
        let others: Vec<tenant::Model> = tenant::Entity::find()
            .filter(tenant::Column::Deleted.eq(false))
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|t| Some(t.id) != id)
            .collect();

        if others.iter().any(|t| t.name == name) {
            return Err(AppError::conflict(format!("名字为【{}】的租户已存在", name)));
        }
        for site in websites {
            if others.iter().any(|t| t.website_list().contains(site)) {
                return Err(AppError::conflict(format!("域名为【{}】的租户已存在", site)));
            }
        }
        Ok(())
    }

    /// Create a tenant with its admin role, admin user and binding
    pub async fn create_tenant(&self, req: TenantSaveRequest, password_hash: &str) -> AppResult<i64> {
        let websites = tenant::split_websites(&req.websites.join(","));
        self.validate_tenant_unique(None, &req.name, &websites).await?;
        let package = self.validate_package_for_tenant(req.package_id).await?;
        let username = req
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::param("用户账号不能为空"))?
            .to_string();

        let now = now();
        let txn = self.db.begin().await?;
        let tenant = tenant::ActiveModel {
            name: Set(req.name.clone()),
            contact_user_id: Set(None),
            contact_name: Set(req.contact_name.clone()),
            contact_mobile: Set(req.contact_mobile.clone()),
            status: Set(req.status),
            websites: Set(websites.join(",")),
            package_id: Set(package.id),
            expire_time: Set(req.expire_time),
            account_count: Set(req.account_count),
            create_time: Set(now),
            update_time: Set(now),
            deleted: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let role = insert_role(
            &txn,
            tenant.id,
            "租户管理员",
            CODE_TENANT_ADMIN,
            RoleType::System,
            DataScope::All,
        )
        .await?;
        set_role_menus(&txn, tenant.id, role.id, &package.menu_id_set()).await?;

        let admin = user::ActiveModel {
            tenant_id: Set(tenant.id),
            username: Set(username),
            password: Set(password_hash.to_string()),
            nickname: Set(req.contact_name),
            remark: Set(String::new()),
            mobile: Set(req.contact_mobile),
            avatar: Set(String::new()),
            status: Set(CommonStatus::Enable.into()),
            create_time: Set(now),
            update_time: Set(now),
            deleted: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        user_role::new_binding(tenant.id, admin.id, role.id)
            .insert(&txn)
            .await?;

        let tenant_id = tenant.id;
        let mut active: tenant::ActiveModel = tenant.into();
        active.contact_user_id = Set(Some(admin.id));
        active.update(&txn).await?;
        txn.commit().await?;

        info!("Tenant created: {} ({}), admin user {}", req.name, tenant_id, admin.id);
        self.invalidate().await?;
        Ok(tenant_id)
    }

    pub async fn update_tenant(&self, req: TenantSaveRequest) -> AppResult<()> {
        let id = req.id.ok_or_else(|| AppError::param("租户编号不能为空"))?;
        let tenant = self.get_tenant(id).await?;
        if tenant.is_system() {
            return Err(AppError::conflict("系统租户不能进行修改、删除等操作！"));
        }
        let websites = tenant::split_websites(&req.websites.join(","));
        self.validate_tenant_unique(Some(id), &req.name, &websites).await?;
        let package = self.validate_package_for_tenant(req.package_id).await?;
        let package_changed = tenant.package_id != package.id;

        let txn = self.db.begin().await?;
        let mut active: tenant::ActiveModel = tenant.into();
        active.name = Set(req.name);
        active.contact_name = Set(req.contact_name);
        active.contact_mobile = Set(req.contact_mobile);
        active.status = Set(req.status);
        active.websites = Set(websites.join(","));
        active.package_id = Set(package.id);
        active.expire_time = Set(req.expire_time);
        active.account_count = Set(req.account_count);
        active.update_time = Set(now());
        active.update(&txn).await?;
        if package_changed {
            project_package_menus(&txn, id, &package.menu_id_set()).await?;
        }
        txn.commit().await?;

        if package_changed {
            info!("Tenant {} moved to package {}", id, package.id);
            self.invalidate().await?;
        }
        Ok(())
    }

    pub async fn delete_tenant(&self, id: i64) -> AppResult<()> {
        let tenant = self.get_tenant(id).await?;
        if tenant.is_system() {
            return Err(AppError::conflict("系统租户不能进行修改、删除等操作！"));
        }
        let mut active: tenant::ActiveModel = tenant.into();
        active.deleted = Set(true);
        active.update_time = Set(now());
        active.update(&self.db).await?;
        info!("Tenant deleted: {}", id);
        Ok(())
    }

    pub async fn get_tenant(&self, id: i64) -> AppResult<tenant::Model> {
        tenant::Entity::find_by_id(id)
            .filter(tenant::Column::Deleted.eq(false))
            .one(&self.db)
            .await?
            .ok_or_not_found("租户不存在")
    }

    pub async fn get_tenant_id_by_name(&self, name: &str) -> AppResult<Option<i64>> {
        let tenant = tenant::Entity::find()
            .filter(tenant::Column::Name.eq(name))
            .filter(tenant::Column::Deleted.eq(false))
            .one(&self.db)
            .await?;
        Ok(tenant.map(|t| t.id))
    }

    pub async fn list_tenants(&self) -> AppResult<Vec<tenant::Model>> {
        Ok(tenant::Entity::find()
            .filter(tenant::Column::Deleted.eq(false))
            .order_by_asc(tenant::Column::Id)
            .all(&self.db)
            .await?)
    }
}
