//! Permission service
//!
//! Role/menu resolution, access checks and the assignment API. Every write
//! commits first and then calls [`PermissionService::invalidate`], which
//! rebuilds the policy store and bumps the cache version.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use tracing::{debug, info};

use super::data_scope::{DataScope, QueryScope, ScopedQuery};
use super::enforcer::PermissionEnforcer;
use super::tenant::package_menu_ids;
use super::{build_menu_tree, PermissionInfo, PermissionUser};
use crate::auth::LoginUser;
use crate::entity::{menu, role, role_menu, user, user_role, CommonStatus};
use crate::error::{AppError, AppResult, OptionExt};

/// Permission service
pub struct PermissionService {
    pub(super) db: DatabaseConnection,
    enforcer: PermissionEnforcer,
    version: AtomicU64,
    info_cache: DashMap<(i64, u64), Arc<PermissionInfo>>,
}

impl PermissionService {
    /// Create the service and load the policy store
    pub async fn new(db: DatabaseConnection) -> AppResult<Self> {
        let enforcer = PermissionEnforcer::new().await?;
        enforcer.load_policies(&db).await?;
        Ok(Self {
            db,
            enforcer,
            version: AtomicU64::new(0),
            info_cache: DashMap::new(),
        })
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Current assignment version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Drop cached permission info and rebuild the policy store.
    ///
    /// Must be called after the writing transaction has committed.
    pub async fn invalidate(&self) -> AppResult<()> {
        let version = self.invalidate_info();
        self.enforcer.load_policies(&self.db).await?;
        debug!("Permission cache invalidated, version {}", version);
        Ok(())
    }

    /// Drop cached permission info only; returns the new version
    pub fn invalidate_info(&self) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.info_cache.clear();
        version
    }

    /// Enabled, non-deleted roles bound to the user
    pub async fn enabled_user_roles<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
    ) -> AppResult<Vec<role::Model>> {
        let role_ids: Vec<i64> = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .all(conn)
            .await?
            .into_iter()
            .map(|ur| ur.role_id)
            .collect();
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let roles = role::Entity::find()
            .filter(role::Column::Id.is_in(role_ids))
            .filter(role::Column::Deleted.eq(false))
            .filter(role::Column::Status.eq(i32::from(CommonStatus::Enable)))
            .all(conn)
            .await?;
        Ok(roles)
    }

    pub async fn is_super_admin(&self, user_id: i64) -> AppResult<bool> {
        let roles = self.enabled_user_roles(&self.db, user_id).await?;
        Ok(roles.iter().any(role::Model::is_super_admin))
    }

    /// Menus granted to the user, clipped to the tenant package
    pub async fn get_user_menu_ids(&self, tenant_id: i64, user_id: i64) -> AppResult<BTreeSet<i64>> {
        let roles = self.enabled_user_roles(&self.db, user_id).await?;
        let live_menus = menu::Entity::find()
            .filter(menu::Column::Deleted.eq(false))
            .filter(menu::Column::Status.eq(i32::from(CommonStatus::Enable)));

        let mut menu_ids: BTreeSet<i64> = if roles.iter().any(role::Model::is_super_admin) {
            live_menus
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| m.id)
                .collect()
        } else {
            if roles.is_empty() {
                return Ok(BTreeSet::new());
            }
            let bound: BTreeSet<i64> = role_menu::Entity::find()
                .filter(role_menu::Column::RoleId.is_in(roles.iter().map(|r| r.id)))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|rm| rm.menu_id)
                .collect();
            if bound.is_empty() {
                return Ok(bound);
            }
            live_menus
                .filter(menu::Column::Id.is_in(bound))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|m| m.id)
                .collect()
        };

        if let Some(package) = package_menu_ids(&self.db, tenant_id).await? {
            menu_ids.retain(|id| package.contains(id));
        }
        Ok(menu_ids)
    }

    /// True when the user holds at least one of the permissions
    pub async fn has_any_permissions(&self, user_id: i64, permissions: &[&str]) -> AppResult<bool> {
        if permissions.is_empty() {
            return Ok(true);
        }
        for permission in permissions {
            if self.enforcer.check(user_id, permission).await {
                return Ok(true);
            }
        }
        self.is_super_admin(user_id).await
    }

    /// Fail with FORBIDDEN unless the user holds the permission
    pub async fn check_permission(&self, user: &LoginUser, permission: &str) -> AppResult<()> {
        if self.has_any_permissions(user.user_id, &[permission]).await? {
            Ok(())
        } else {
            debug!("User {} lacks permission {}", user.user_id, permission);
            Err(AppError::forbidden())
        }
    }

    /// Identity, role codes, permission strings and menu tree of the user
    pub async fn get_permission_info(&self, login_user: &LoginUser) -> AppResult<Arc<PermissionInfo>> {
        let key = (login_user.user_id, self.version());
        if let Some(info) = self.info_cache.get(&key) {
            return Ok(info.clone());
        }

        let user = user::Entity::find_by_id(login_user.user_id)
            .scoped(&QueryScope::tenant(login_user.tenant_id))
            .one(&self.db)
            .await?
            .ok_or_not_found("用户不存在")?;

        let roles = self.enabled_user_roles(&self.db, user.id).await?;
        let menu_ids = self.get_user_menu_ids(login_user.tenant_id, user.id).await?;
        let menus = if menu_ids.is_empty() {
            Vec::new()
        } else {
            menu::Entity::find()
                .filter(menu::Column::Id.is_in(menu_ids))
                .all(&self.db)
                .await?
        };

        let permissions: BTreeSet<String> = menus
            .iter()
            .filter(|m| !m.permission.is_empty())
            .map(|m| m.permission.clone())
            .collect();

        let info = Arc::new(PermissionInfo {
            user: PermissionUser {
                id: user.id,
                nickname: user.nickname,
                avatar: user.avatar,
                dept_id: user.dept_id,
            },
            roles: roles.into_iter().map(|r| r.code).collect(),
            permissions,
            menus: build_menu_tree(menus),
        });
        self.info_cache.insert(key, info.clone());
        Ok(info)
    }

    async fn find_role(&self, tenant_id: i64, role_id: i64) -> AppResult<role::Model> {
        role::Entity::find_by_id(role_id)
            .scoped(&QueryScope::tenant(tenant_id))
            .one(&self.db)
            .await?
            .ok_or_not_found("角色不存在")
    }

    /// Overwrite the role's menu set; menus outside the tenant package are dropped
    pub async fn assign_role_menu(
        &self,
        tenant_id: i64,
        role_id: i64,
        menu_ids: BTreeSet<i64>,
    ) -> AppResult<()> {
        let role = self.find_role(tenant_id, role_id).await?;
        let mut menu_ids = menu_ids;
        if let Some(package) = package_menu_ids(&self.db, role.tenant_id).await? {
            menu_ids.retain(|id| package.contains(id));
        }

        let txn = self.db.begin().await?;
        set_role_menus(&txn, role.tenant_id, role.id, &menu_ids).await?;
        txn.commit().await?;

        info!("Assigned {} menus to role {}", menu_ids.len(), role.id);
        self.invalidate().await
    }

    pub async fn assign_role_data_scope(
        &self,
        tenant_id: i64,
        role_id: i64,
        data_scope: i32,
        dept_ids: BTreeSet<i64>,
    ) -> AppResult<()> {
        let scope = DataScope::try_from(data_scope).map_err(AppError::param)?;
        let role = self.find_role(tenant_id, role_id).await?;
        if role.is_system() {
            return Err(AppError::conflict("不能操作类型为系统内置的角色"));
        }

        let dept_ids = if scope == DataScope::CustomDepts {
            dept_ids
        } else {
            BTreeSet::new()
        };
        let mut active: role::ActiveModel = role.into();
        active.data_scope = Set(scope.into());
        active.data_scope_dept_ids = Set(crate::entity::format_id_set(&dept_ids));
        active.update_time = Set(crate::entity::now());
        active.update(&self.db).await?;

        self.invalidate().await
    }

    /// Overwrite the user's role set
    pub async fn assign_user_role(
        &self,
        tenant_id: i64,
        user_id: i64,
        role_ids: BTreeSet<i64>,
    ) -> AppResult<()> {
        let scope = QueryScope::tenant(tenant_id);
        let user = user::Entity::find_by_id(user_id)
            .scoped(&scope)
            .one(&self.db)
            .await?
            .ok_or_not_found("用户不存在")?;

        if !role_ids.is_empty() {
            let found = role::Entity::find()
                .filter(role::Column::Id.is_in(role_ids.iter().copied()))
                .scoped(&scope)
                .all(&self.db)
                .await?;
            if found.len() != role_ids.len() {
                return Err(AppError::not_found("角色不存在"));
            }
        }

        let txn = self.db.begin().await?;
        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(user.id))
            .exec(&txn)
            .await?;
        if !role_ids.is_empty() {
            user_role::Entity::insert_many(
                role_ids
                    .iter()
                    .map(|role_id| user_role::new_binding(user.tenant_id, user.id, *role_id)),
            )
            .exec(&txn)
            .await?;
        }
        txn.commit().await?;

        info!("Assigned roles {:?} to user {}", role_ids, user.id);
        self.invalidate().await
    }

    pub async fn list_role_menu_ids(&self, tenant_id: i64, role_id: i64) -> AppResult<BTreeSet<i64>> {
        let role = self.find_role(tenant_id, role_id).await?;
        list_role_menu_ids(&self.db, role.id).await
    }

    pub async fn list_user_role_ids(&self, tenant_id: i64, user_id: i64) -> AppResult<BTreeSet<i64>> {
        let ids = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .scoped(&QueryScope::tenant(tenant_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|ur| ur.role_id)
            .collect();
        Ok(ids)
    }
}

pub(crate) async fn list_role_menu_ids<C: ConnectionTrait>(
    conn: &C,
    role_id: i64,
) -> AppResult<BTreeSet<i64>> {
    let ids = role_menu::Entity::find()
        .filter(role_menu::Column::RoleId.eq(role_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|rm| rm.menu_id)
        .collect();
    Ok(ids)
}

/// Delete-then-insert of a role's menu bindings on the given connection
pub(crate) async fn set_role_menus<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
    role_id: i64,
    menu_ids: &BTreeSet<i64>,
) -> AppResult<()> {
    role_menu::Entity::delete_many()
        .filter(role_menu::Column::RoleId.eq(role_id))
        .exec(conn)
        .await?;
    if !menu_ids.is_empty() {
        role_menu::Entity::insert_many(
            menu_ids
                .iter()
                .map(|menu_id| role_menu::new_binding(tenant_id, role_id, *menu_id)),
        )
        .exec(conn)
        .await?;
    }
    Ok(())
}
