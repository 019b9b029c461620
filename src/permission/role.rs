//! Role management

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::info;

use super::data_scope::{DataScope, QueryScope, ScopedQuery};
use super::PermissionService;
use crate::entity::role::{self, RoleType, CODE_SUPER_ADMIN, CODE_TENANT_ADMIN};
use crate::entity::{now, role_menu, user_role, CommonStatus};
use crate::error::{AppError, AppResult, OptionExt};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSaveRequest {
    pub id: Option<i64>,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub sort: i32,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub remark: String,
}

/// Insert a role row on the given connection
pub(crate) async fn insert_role<C: ConnectionTrait>(
    conn: &C,
    tenant_id: i64,
    name: &str,
    code: &str,
    role_type: RoleType,
    data_scope: DataScope,
) -> AppResult<role::Model> {
    let now = now();
    let role = role::ActiveModel {
        tenant_id: Set(tenant_id),
        name: Set(name.to_string()),
        code: Set(code.to_string()),
        sort: Set(0),
        role_type: Set(role_type as i32),
        status: Set(CommonStatus::Enable.into()),
        data_scope: Set(data_scope.into()),
        data_scope_dept_ids: Set("[]".to_string()),
        remark: Set(String::new()),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(role)
}

impl PermissionService {
    async fn validate_role_unique(
        &self,
        tenant_id: i64,
        id: Option<i64>,
        name: &str,
        code: &str,
    ) -> AppResult<()> {
        if name.trim().is_empty() || code.trim().is_empty() {
            return Err(AppError::param("角色名称和角色标识不能为空"));
        }
        if code == CODE_SUPER_ADMIN || code == CODE_TENANT_ADMIN {
            return Err(AppError::conflict(format!("标识【{}】不能使用", code)));
        }

        let scope = QueryScope::tenant(tenant_id);
        let same_name = role::Entity::find()
            .filter(role::Column::Name.eq(name))
            .scoped(&scope)
            .one(&self.db)
            .await?;
        if matches!(same_name, Some(r) if Some(r.id) != id) {
            return Err(AppError::conflict(format!("已经存在名为【{}】的角色", name)));
        }
        let same_code = role::Entity::find()
            .filter(role::Column::Code.eq(code))
            .scoped(&scope)
            .one(&self.db)
            .await?;
        if matches!(same_code, Some(r) if Some(r.id) != id) {
            return Err(AppError::conflict(format!("已经存在标识为【{}】的角色", code)));
        }
        Ok(())
    }

    /// Role that may be modified: exists and is not built in
    async fn role_for_update(&self, tenant_id: i64, id: i64) -> AppResult<role::Model> {
        let role = self.get_role(tenant_id, id).await?;
        if role.is_system() {
            return Err(AppError::conflict("不能操作类型为系统内置的角色"));
        }
        Ok(role)
    }

    pub async fn create_role(&self, tenant_id: i64, req: RoleSaveRequest) -> AppResult<i64> {
        self.validate_role_unique(tenant_id, None, &req.name, &req.code)
            .await?;
        let now = now();
        let role = role::ActiveModel {
            tenant_id: Set(tenant_id),
            name: Set(req.name),
            code: Set(req.code),
            sort: Set(req.sort),
            role_type: Set(RoleType::Custom as i32),
            status: Set(req.status),
            data_scope: Set(DataScope::All.into()),
            data_scope_dept_ids: Set("[]".to_string()),
            remark: Set(req.remark),
            create_time: Set(now),
            update_time: Set(now),
            deleted: Set(false),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        info!("Role created: {} ({})", role.code, role.id);
        Ok(role.id)
    }

    pub async fn update_role(&self, tenant_id: i64, req: RoleSaveRequest) -> AppResult<()> {
        let id = req.id.ok_or_else(|| AppError::param("角色编号不能为空"))?;
        let role = self.role_for_update(tenant_id, id).await?;
        self.validate_role_unique(tenant_id, Some(id), &req.name, &req.code)
            .await?;

        let status_changed = role.status != req.status;
        let mut active: role::ActiveModel = role.into();
        active.name = Set(req.name);
        active.code = Set(req.code);
        active.sort = Set(req.sort);
        active.status = Set(req.status);
        active.remark = Set(req.remark);
        active.update_time = Set(now());
        active.update(&self.db).await?;

        if status_changed {
            self.invalidate().await?;
        }
        Ok(())
    }

    pub async fn update_role_status(&self, tenant_id: i64, id: i64, status: i32) -> AppResult<()> {
        let role = self.role_for_update(tenant_id, id).await?;
        let mut active: role::ActiveModel = role.into();
        active.status = Set(CommonStatus::from(status).into());
        active.update_time = Set(now());
        active.update(&self.db).await?;
        self.invalidate().await
    }

    /// Soft delete; fails while users are still assigned
    pub async fn delete_role(&self, tenant_id: i64, id: i64) -> AppResult<()> {
        let role = self.role_for_update(tenant_id, id).await?;
        let assigned = user_role::Entity::find()
            .filter(user_role::Column::RoleId.eq(id))
            .count(&self.db)
            .await?;
        if assigned > 0 {
            return Err(AppError::conflict("角色已分配给用户，无法删除"));
        }

        let txn = self.db.begin().await?;
        let mut active: role::ActiveModel = role.into();
        active.deleted = Set(true);
        active.update_time = Set(now());
        active.update(&txn).await?;
        role_menu::Entity::delete_many()
            .filter(role_menu::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!("Role deleted: {}", id);
        self.invalidate().await
    }

    pub async fn get_role(&self, tenant_id: i64, id: i64) -> AppResult<role::Model> {
        role::Entity::find_by_id(id)
            .scoped(&QueryScope::tenant(tenant_id))
            .one(&self.db)
            .await?
            .ok_or_not_found("角色不存在")
    }

    pub async fn list_roles(&self, scope: &QueryScope) -> AppResult<Vec<role::Model>> {
        Ok(role::Entity::find()
            .scoped(scope)
            .order_by_asc(role::Column::Sort)
            .order_by_asc(role::Column::Id)
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing;

    fn request(name: &str, code: &str) -> RoleSaveRequest {
        RoleSaveRequest {
            id: None,
            name: name.to_string(),
            code: code.to_string(),
            sort: 1,
            status: 0,
            remark: String::new(),
        }
    }

    #[tokio::test]
    async fn test_role_lifecycle() {
        let state = testing::test_state().await;
        let id = state.perm.create_role(1, request("编辑", "editor")).await.unwrap();

        let mut update = request("编辑者", "editor");
        update.id = Some(id);
        state.perm.update_role(1, update).await.unwrap();
        assert_eq!(state.perm.get_role(1, id).await.unwrap().name, "编辑者");

        state.perm.update_role_status(1, id, 1).await.unwrap();
        assert_eq!(state.perm.get_role(1, id).await.unwrap().status, 1);

        let before = state.perm.list_roles(&QueryScope::tenant(1)).await.unwrap().len();
        state.perm.delete_role(1, id).await.unwrap();
        let after = state.perm.list_roles(&QueryScope::tenant(1)).await.unwrap().len();
        assert_eq!(after + 1, before);
        assert_eq!(
            state.perm.get_role(1, id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_role_conflicts() {
        let state = testing::test_state().await;
        let err = state
            .perm
            .create_role(1, request("x", CODE_SUPER_ADMIN))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        state.perm.create_role(1, request("a", "a")).await.unwrap();
        let err = state.perm.create_role(1, request("a", "b")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = state.perm.create_role(1, request("b", "a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // the same code is free in another tenant
        tokio_test::assert_ok!(state.perm.create_role(2, request("a", "a")).await);
    }

    #[tokio::test]
    async fn test_system_role_and_assigned_role_protected() {
        let state = testing::test_state().await;
        let super_admin = role::Entity::find()
            .filter(role::Column::Code.eq(CODE_SUPER_ADMIN))
            .one(&state.db)
            .await
            .unwrap()
            .unwrap();
        let err = state
            .perm
            .update_role_status(1, super_admin.id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = state.perm.delete_role(1, super_admin.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let id = state.perm.create_role(1, request("used", "used")).await.unwrap();
        testing::bind_user_role(&state.db, 1, testing::ADMIN_USER_ID, id).await;
        let err = state.perm.delete_role(1, id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.client_message(), "角色已分配给用户，无法删除");
    }

    #[tokio::test]
    async fn test_disabling_role_revokes_permissions() {
        let state = testing::test_state().await;
        let menu = testing::insert_menu(&state.db, 0, "job", "infra:job:query").await;
        let user = testing::insert_user(&state.db, 1, "viewer", None).await;
        let id = state.perm.create_role(1, request("viewer", "viewer")).await.unwrap();
        state
            .perm
            .assign_role_menu(1, id, [menu.id].into_iter().collect())
            .await
            .unwrap();
        state
            .perm
            .assign_user_role(1, user.id, [id].into_iter().collect())
            .await
            .unwrap();
        assert!(state.perm.has_any_permissions(user.id, &["infra:job:query"]).await.unwrap());

        state.perm.update_role_status(1, id, 1).await.unwrap();
        assert!(!state.perm.has_any_permissions(user.id, &["infra:job:query"]).await.unwrap());
    }
}
