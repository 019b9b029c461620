//! Data scope: row-level visibility by department and ownership
//!
//! A [`QueryScope`] is resolved once per request from the caller's roles and
//! then applied to SeaORM queries through [`ScopedQuery::scoped`], which
//! appends the tenant filter, the soft-delete filter and the data-scope
//! predicate. Queries the permission engine issues for itself are built
//! without a scope.

use std::collections::{BTreeSet, HashMap};

use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DeleteMany, EntityTrait, QueryFilter, Select,
    UpdateMany,
};
use serde::{Deserialize, Serialize};

use super::PermissionService;
use crate::auth::LoginUser;
use crate::entity::{
    dept, login_log, menu, role, role_menu, tenant, tenant_package, user, user_role,
};
use crate::error::AppResult;

/// 数据范围
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum DataScope {
    /// 全部数据权限
    All = 1,
    /// 指定部门数据权限
    CustomDepts = 2,
    /// 本部门数据权限
    OwnDept = 3,
    /// 本部门及以下数据权限
    OwnAndChildDepts = 4,
    /// 仅本人数据权限
    SelfOnly = 5,
}

impl From<DataScope> for i32 {
    fn from(scope: DataScope) -> Self {
        scope as i32
    }
}

impl TryFrom<i32> for DataScope {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => DataScope::All,
            2 => DataScope::CustomDepts,
            3 => DataScope::OwnDept,
            4 => DataScope::OwnAndChildDepts,
            5 => DataScope::SelfOnly,
            other => return Err(format!("无效的数据范围: {}", other)),
        })
    }
}

/// Resolved visibility of a caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataPermission {
    All,
    /// Rows whose department is in the set
    Depts(BTreeSet<i64>),
    /// Rows created by the caller
    SelfOnly,
}

/// Columns the data-scope predicate is written against
pub struct DataScopeColumns<C> {
    pub dept: Option<C>,
    pub creator: Option<C>,
}

/// Entities that take part in scoped queries
pub trait ScopedEntity: EntityTrait {
    fn tenant_column() -> Option<Self::Column> {
        None
    }

    fn deleted_column() -> Option<Self::Column> {
        None
    }

    /// `None` for tables without row-level visibility
    fn data_scope_columns() -> Option<DataScopeColumns<Self::Column>> {
        None
    }
}

impl ScopedEntity for user::Entity {
    fn tenant_column() -> Option<Self::Column> {
        Some(user::Column::TenantId)
    }

    fn deleted_column() -> Option<Self::Column> {
        Some(user::Column::Deleted)
    }

    fn data_scope_columns() -> Option<DataScopeColumns<Self::Column>> {
        Some(DataScopeColumns {
            dept: Some(user::Column::DeptId),
            creator: Some(user::Column::Creator),
        })
    }
}

impl ScopedEntity for dept::Entity {
    fn tenant_column() -> Option<Self::Column> {
        Some(dept::Column::TenantId)
    }

    fn deleted_column() -> Option<Self::Column> {
        Some(dept::Column::Deleted)
    }

    fn data_scope_columns() -> Option<DataScopeColumns<Self::Column>> {
        Some(DataScopeColumns {
            dept: Some(dept::Column::Id),
            creator: Some(dept::Column::Creator),
        })
    }
}

impl ScopedEntity for role::Entity {
    fn tenant_column() -> Option<Self::Column> {
        Some(role::Column::TenantId)
    }

    fn deleted_column() -> Option<Self::Column> {
        Some(role::Column::Deleted)
    }
}

impl ScopedEntity for menu::Entity {
    fn deleted_column() -> Option<Self::Column> {
        Some(menu::Column::Deleted)
    }
}

impl ScopedEntity for tenant::Entity {
    fn deleted_column() -> Option<Self::Column> {
        Some(tenant::Column::Deleted)
    }
}

impl ScopedEntity for tenant_package::Entity {
    fn deleted_column() -> Option<Self::Column> {
        Some(tenant_package::Column::Deleted)
    }
}

impl ScopedEntity for user_role::Entity {
    fn tenant_column() -> Option<Self::Column> {
        Some(user_role::Column::TenantId)
    }
}

impl ScopedEntity for role_menu::Entity {
    fn tenant_column() -> Option<Self::Column> {
        Some(role_menu::Column::TenantId)
    }
}

impl ScopedEntity for login_log::Entity {
    fn tenant_column() -> Option<Self::Column> {
        Some(login_log::Column::TenantId)
    }
}

/// Request-scoped query filter
#[derive(Clone, Debug)]
pub struct QueryScope {
    tenant_id: Option<i64>,
    user_id: i64,
    data_permission: DataPermission,
    skip_data_scope: bool,
}

impl QueryScope {
    pub fn new(tenant_id: Option<i64>, user_id: i64, data_permission: DataPermission) -> Self {
        Self {
            tenant_id,
            user_id,
            data_permission,
            skip_data_scope: false,
        }
    }

    /// Tenant and soft-delete filters only
    pub fn tenant(tenant_id: i64) -> Self {
        Self::new(Some(tenant_id), 0, DataPermission::All)
    }

    /// Same tenant filter with the data-scope predicate suppressed
    pub fn without_data_scope(&self) -> Self {
        Self {
            skip_data_scope: true,
            ..self.clone()
        }
    }

    pub fn tenant_id(&self) -> Option<i64> {
        self.tenant_id
    }

    pub fn data_permission(&self) -> &DataPermission {
        &self.data_permission
    }

    /// Predicate for entity `E`; empty when nothing applies
    pub fn condition<E: ScopedEntity>(&self) -> Condition {
        let mut cond = Condition::all();
        if let (Some(tenant_id), Some(col)) = (self.tenant_id, E::tenant_column()) {
            cond = cond.add(col.eq(tenant_id));
        }
        if let Some(col) = E::deleted_column() {
            cond = cond.add(col.eq(false));
        }
        if let Some(expr) = self.data_scope_expr::<E>() {
            cond = cond.add(expr);
        }
        cond
    }

    fn data_scope_expr<E: ScopedEntity>(&self) -> Option<SimpleExpr> {
        if self.skip_data_scope {
            return None;
        }
        let columns = E::data_scope_columns()?;
        match &self.data_permission {
            DataPermission::All => None,
            DataPermission::Depts(ids) => match columns.dept {
                Some(col) => Some(col.is_in(ids.iter().copied())),
                None => Some(self.self_expr(columns.creator)),
            },
            DataPermission::SelfOnly => Some(self.self_expr(columns.creator)),
        }
    }

    fn self_expr<C: ColumnTrait>(&self, creator: Option<C>) -> SimpleExpr {
        match creator {
            Some(col) => col.eq(self.user_id),
            // no owner column: nothing is visible
            None => Expr::val(1).eq(0),
        }
    }
}

/// Apply a [`QueryScope`] to a query
pub trait ScopedQuery: Sized {
    fn scoped(self, scope: &QueryScope) -> Self;
}

impl<E: ScopedEntity> ScopedQuery for Select<E> {
    fn scoped(self, scope: &QueryScope) -> Self {
        let cond = scope.condition::<E>();
        if cond.is_empty() {
            self
        } else {
            self.filter(cond)
        }
    }
}

impl<E: ScopedEntity> ScopedQuery for UpdateMany<E> {
    fn scoped(self, scope: &QueryScope) -> Self {
        let cond = scope.condition::<E>();
        if cond.is_empty() {
            self
        } else {
            self.filter(cond)
        }
    }
}

impl<E: ScopedEntity> ScopedQuery for DeleteMany<E> {
    fn scoped(self, scope: &QueryScope) -> Self {
        let cond = scope.condition::<E>();
        if cond.is_empty() {
            self
        } else {
            self.filter(cond)
        }
    }
}

/// The department and every department below it
pub async fn dept_with_descendants<C: ConnectionTrait>(
    db: &C,
    tenant_id: i64,
    dept_id: i64,
) -> AppResult<BTreeSet<i64>> {
    let depts = dept::Entity::find()
        .filter(dept::Column::TenantId.eq(tenant_id))
        .filter(dept::Column::Deleted.eq(false))
        .all(db)
        .await?;

    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for d in &depts {
        children.entry(d.parent_id).or_default().push(d.id);
    }

    let mut result = BTreeSet::new();
    let mut stack = vec![dept_id];
    while let Some(id) = stack.pop() {
        if !result.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            stack.extend(kids.iter().copied());
        }
    }
    Ok(result)
}

impl PermissionService {
    /// Scope for queries issued on behalf of the user
    pub async fn query_scope(&self, user: &LoginUser) -> QueryScope {
        QueryScope::new(
            Some(user.tenant_id),
            user.user_id,
            self.data_permission(user).await,
        )
    }

    /// Visibility of the user; lookup failures fall back to own rows
    pub async fn data_permission(&self, user: &LoginUser) -> DataPermission {
        if !user.is_admin() {
            return DataPermission::All;
        }
        match self.resolve_data_permission(user).await {
            Ok(permission) => permission,
            Err(e) => {
                tracing::warn!(
                    "Data scope lookup failed for user {}, restricting to own rows: {}",
                    user.user_id,
                    e
                );
                DataPermission::SelfOnly
            }
        }
    }

    async fn resolve_data_permission(&self, login_user: &LoginUser) -> AppResult<DataPermission> {
        let roles = self.enabled_user_roles(&self.db, login_user.user_id).await?;
        if roles.iter().any(role::Model::is_super_admin) {
            return Ok(DataPermission::All);
        }

        let scoped: Vec<(DataScope, &role::Model)> = roles
            .iter()
            .filter_map(|r| match DataScope::try_from(r.data_scope) {
                Ok(scope) => Some((scope, r)),
                Err(e) => {
                    tracing::warn!("Role {} has {}", r.id, e);
                    None
                }
            })
            .collect();
        let Some(winner) = scoped.iter().map(|(scope, _)| *scope).min() else {
            return Ok(DataPermission::SelfOnly);
        };

        let dept_id = || async {
            let found = user::Entity::find_by_id(login_user.user_id)
                .one(&self.db)
                .await?;
            AppResult::Ok(found.and_then(|u| u.dept_id))
        };

        let permission = match winner {
            DataScope::All => DataPermission::All,
            DataScope::CustomDepts => DataPermission::Depts(
                scoped
                    .iter()
                    .filter(|(scope, _)| *scope == DataScope::CustomDepts)
                    .flat_map(|(_, r)| r.data_scope_dept_id_set())
                    .collect(),
            ),
            DataScope::OwnDept => match dept_id().await? {
                Some(dept_id) => DataPermission::Depts(BTreeSet::from([dept_id])),
                None => DataPermission::SelfOnly,
            },
            DataScope::OwnAndChildDepts => match dept_id().await? {
                Some(dept_id) => DataPermission::Depts(
                    dept_with_descendants(&self.db, login_user.tenant_id, dept_id).await?,
                ),
                None => DataPermission::SelfOnly,
            },
            DataScope::SelfOnly => DataPermission::SelfOnly,
        };
        Ok(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserType;
    use crate::testing;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql<E: ScopedEntity>(scope: &QueryScope) -> String {
        E::find().scoped(scope).build(DbBackend::Sqlite).to_string()
    }

    fn admin(user_id: i64) -> LoginUser {
        LoginUser {
            user_id,
            user_type: UserType::Admin,
            tenant_id: 1,
            nickname: "u".to_string(),
        }
    }

    #[test]
    fn test_lowest_scope_wins() {
        assert!(DataScope::All < DataScope::CustomDepts);
        assert!(DataScope::OwnAndChildDepts < DataScope::SelfOnly);
        assert!(DataScope::try_from(9).is_err());
    }

    #[test]
    fn test_self_scope_predicate() {
        let scope = QueryScope::new(Some(1), 7, DataPermission::SelfOnly);
        let self_sql = sql::<user::Entity>(&scope);
        assert!(self_sql.contains(r#""tenant_id" = 1"#), "{}", self_sql);
        assert!(self_sql.contains(r#""deleted" = "#), "{}", self_sql);
        assert!(self_sql.contains(r#""creator" = 7"#), "{}", self_sql);
    }

    #[test]
    fn test_dept_scope_predicate() {
        let scope = QueryScope::new(Some(1), 7, DataPermission::Depts(BTreeSet::from([3, 4])));
        let dept_sql = sql::<user::Entity>(&scope);
        assert!(dept_sql.contains(r#""dept_id" IN (3, 4)"#), "{}", dept_sql);

        let empty = QueryScope::new(Some(1), 7, DataPermission::Depts(BTreeSet::new()));
        assert!(sql::<user::Entity>(&empty).contains("1 = 2"));
    }

    #[test]
    fn test_unscoped_tables_and_skip_flag() {
        let scope = QueryScope::new(Some(1), 7, DataPermission::SelfOnly);
        let role_sql = sql::<role::Entity>(&scope);
        assert!(!role_sql.contains(r#""creator" = 7"#), "{}", role_sql);

        let skipped = scope.without_data_scope();
        let user_sql = sql::<user::Entity>(&skipped);
        assert!(!user_sql.contains(r#""creator" = 7"#), "{}", user_sql);
        assert!(user_sql.contains(r#""tenant_id" = 1"#));

        let menu_sql = sql::<menu::Entity>(&scope);
        assert!(!menu_sql.contains("tenant_id"), "{}", menu_sql);
    }

    #[test]
    fn test_scoped_update_and_delete() {
        let scope = QueryScope::new(Some(2), 7, DataPermission::SelfOnly);
        let update = user::Entity::update_many()
            .col_expr(user::Column::Status, Expr::value(1))
            .scoped(&scope)
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(update.contains(r#""creator" = 7"#), "{}", update);

        let delete = user::Entity::delete_many()
            .scoped(&scope)
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(delete.contains(r#""tenant_id" = 2"#), "{}", delete);
    }

    #[tokio::test]
    async fn test_descendants() {
        let db = testing::memory_db().await;
        let root = testing::insert_dept(&db, 1, 0, "root").await;
        let child = testing::insert_dept(&db, 1, root.id, "child").await;
        let grandchild = testing::insert_dept(&db, 1, child.id, "grandchild").await;
        let other = testing::insert_dept(&db, 1, 0, "other").await;

        let ids = dept_with_descendants(&db, 1, root.id).await.unwrap();
        assert_eq!(ids, BTreeSet::from([root.id, child.id, grandchild.id]));
        assert!(!ids.contains(&other.id));
    }

    #[tokio::test]
    async fn test_self_role_limits_user_queries() {
        let state = testing::test_state().await;
        let role = testing::insert_role(&state.db, 1, "self_only", DataScope::SelfOnly.into()).await;
        let user = testing::insert_user(&state.db, 1, "scoped", None).await;
        testing::bind_user_role(&state.db, 1, user.id, role.id).await;

        let scope = state.perm.query_scope(&admin(user.id)).await;
        assert_eq!(scope.data_permission(), &DataPermission::SelfOnly);
        let sql = sql::<user::Entity>(&scope);
        assert!(sql.contains(&format!(r#""creator" = {}"#, user.id)), "{}", sql);

        // only rows the user created are visible
        testing::insert_user_created_by(&state.db, 1, "mine", user.id).await;
        let visible = user::Entity::find()
            .scoped(&scope)
            .all(&state.db)
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].username, "mine");

        // ALL sees a superset
        let all = user::Entity::find()
            .scoped(&QueryScope::tenant(1))
            .all(&state.db)
            .await
            .unwrap();
        assert!(all.len() > visible.len());
    }

    #[tokio::test]
    async fn test_most_permissive_role_wins() {
        let state = testing::test_state().await;
        let root = testing::insert_dept(&state.db, 1, 0, "root").await;
        let child = testing::insert_dept(&state.db, 1, root.id, "child").await;
        let user = testing::insert_user(&state.db, 1, "lead", Some(root.id)).await;

        let own = testing::insert_role(&state.db, 1, "own", DataScope::OwnDept.into()).await;
        let tree = testing::insert_role(&state.db, 1, "tree", DataScope::OwnAndChildDepts.into()).await;
        testing::bind_user_role(&state.db, 1, user.id, own.id).await;
        testing::bind_user_role(&state.db, 1, user.id, tree.id).await;

        let permission = state.perm.data_permission(&admin(user.id)).await;
        assert_eq!(permission, DataPermission::Depts(BTreeSet::from([root.id])));

        let custom = testing::insert_role(&state.db, 1, "custom", DataScope::CustomDepts.into()).await;
        state
            .perm
            .assign_role_data_scope(1, custom.id, DataScope::CustomDepts.into(), BTreeSet::from([child.id]))
            .await
            .unwrap();
        testing::bind_user_role(&state.db, 1, user.id, custom.id).await;
        let permission = state.perm.data_permission(&admin(user.id)).await;
        assert_eq!(permission, DataPermission::Depts(BTreeSet::from([child.id])));
    }

    #[tokio::test]
    async fn test_missing_dept_downgrades_to_self() {
        let state = testing::test_state().await;
        let user = testing::insert_user(&state.db, 1, "nodept", None).await;
        let role = testing::insert_role(&state.db, 1, "own", DataScope::OwnDept.into()).await;
        testing::bind_user_role(&state.db, 1, user.id, role.id).await;

        let permission = state.perm.data_permission(&admin(user.id)).await;
        assert_eq!(permission, DataPermission::SelfOnly);
    }

    #[tokio::test]
    async fn test_super_admin_and_members_skip() {
        let state = testing::test_state().await;
        let permission = state
            .perm
            .data_permission(&admin(testing::ADMIN_USER_ID))
            .await;
        assert_eq!(permission, DataPermission::All);

        let member = LoginUser {
            user_type: UserType::Member,
            ..admin(999)
        };
        assert_eq!(state.perm.data_permission(&member).await, DataPermission::All);

        // admin without roles sees only own rows
        assert_eq!(
            state.perm.data_permission(&admin(999)).await,
            DataPermission::SelfOnly
        );
    }
}
