//! Casbin enforcer over the role and menu tables
//!
//! Policies are derived, never stored: `p, role:<id>, <permission>, access` for
//! every enabled role-menu binding and `g, user:<id>, role:<id>` for every
//! user-role binding.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use casbin::{CoreApi, DefaultModel, Enforcer, MgmtApi};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tokio::sync::RwLock;

use crate::entity::{menu, role, role_menu, user_role, CommonStatus};
use crate::error::AppResult;

/// Action used by every policy
pub const ACTION_ACCESS: &str = "access";

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

pub fn user_subject(user_id: i64) -> String {
    format!("user:{}", user_id)
}

pub fn role_subject(role_id: i64) -> String {
    format!("role:{}", role_id)
}

/// Permission enforcer wrapper
#[derive(Clone)]
pub struct PermissionEnforcer {
    enforcer: Arc<RwLock<Enforcer>>,
}

impl PermissionEnforcer {
    /// Create an enforcer with no policies
    pub async fn new() -> AppResult<Self> {
        let model = DefaultModel::from_str(MODEL).await?;
        let enforcer = Enforcer::new(model, ()).await?;
        Ok(Self {
            enforcer: Arc::new(RwLock::new(enforcer)),
        })
    }

    /// Rebuild all policies from live (enabled, non-deleted) rows
    pub async fn load_policies<C: ConnectionTrait>(&self, db: &C) -> AppResult<()> {
        let role_ids: BTreeSet<i64> = role::Entity::find()
            .filter(role::Column::Deleted.eq(false))
            .filter(role::Column::Status.eq(i32::from(CommonStatus::Enable)))
            .all(db)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let permissions: HashMap<i64, String> = menu::Entity::find()
            .filter(menu::Column::Deleted.eq(false))
            .filter(menu::Column::Status.eq(i32::from(CommonStatus::Enable)))
            .filter(menu::Column::Permission.ne(""))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.permission))
            .collect();

        let policies: BTreeSet<Vec<String>> = role_menu::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .filter(|rm| role_ids.contains(&rm.role_id))
            .filter_map(|rm| {
                permissions.get(&rm.menu_id).map(|perm| {
                    vec![
                        role_subject(rm.role_id),
                        perm.clone(),
                        ACTION_ACCESS.to_string(),
                    ]
                })
            })
            .collect();

        let groupings: BTreeSet<Vec<String>> = user_role::Entity::find()
            .all(db)
            .await?
            .into_iter()
            .filter(|ur| role_ids.contains(&ur.role_id))
            .map(|ur| vec![user_subject(ur.user_id), role_subject(ur.role_id)])
            .collect();

        let mut enforcer = self.enforcer.write().await;
        enforcer.clear_policy().await?;
        if !policies.is_empty() {
            enforcer.add_policies(policies.into_iter().collect()).await?;
        }
        if !groupings.is_empty() {
            enforcer
                .add_grouping_policies(groupings.into_iter().collect())
                .await?;
        }
        // clear_policy leaves the role manager's links in place
        enforcer.build_role_links()?;
        tracing::debug!("Permission policies reloaded");
        Ok(())
    }

    /// Check if the user holds the permission through any of its roles
    pub async fn check(&self, user_id: i64, permission: &str) -> bool {
        let enforcer = self.enforcer.read().await;
        enforcer
            .enforce((user_subject(user_id).as_str(), permission, ACTION_ACCESS))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_policies_follow_bindings() {
        let db = testing::memory_db().await;
        let menu = testing::insert_menu(&db, 0, "user-update", "system:user:update").await;
        let role = testing::insert_role(&db, 1, "editor", 5).await;
        testing::bind_role_menu(&db, 1, role.id, menu.id).await;
        testing::bind_user_role(&db, 1, 7, role.id).await;

        let enforcer = PermissionEnforcer::new().await.unwrap();
        assert!(!enforcer.check(7, "system:user:update").await);

        enforcer.load_policies(&db).await.unwrap();
        assert!(enforcer.check(7, "system:user:update").await);
        assert!(!enforcer.check(7, "system:user:delete").await);
        assert!(!enforcer.check(8, "system:user:update").await);
    }

    #[tokio::test]
    async fn test_disabled_role_grants_nothing() {
        let db = testing::memory_db().await;
        let menu = testing::insert_menu(&db, 0, "user-update", "system:user:update").await;
        let role = testing::insert_role(&db, 1, "editor", 5).await;
        testing::bind_role_menu(&db, 1, role.id, menu.id).await;
        testing::bind_user_role(&db, 1, 7, role.id).await;

        use sea_orm::{ActiveModelTrait, Set};
        let mut active: role::ActiveModel = role.into();
        active.status = Set(CommonStatus::Disable.into());
        active.update(&db).await.unwrap();

        let enforcer = PermissionEnforcer::new().await.unwrap();
        enforcer.load_policies(&db).await.unwrap();
        assert!(!enforcer.check(7, "system:user:update").await);
    }

    #[tokio::test]
    async fn test_unbinding_revokes_on_reload() {
        let db = testing::memory_db().await;
        let menu = testing::insert_menu(&db, 0, "user-update", "system:user:update").await;
        let role = testing::insert_role(&db, 1, "editor", 5).await;
        testing::bind_role_menu(&db, 1, role.id, menu.id).await;
        testing::bind_user_role(&db, 1, 7, role.id).await;

        let enforcer = PermissionEnforcer::new().await.unwrap();
        enforcer.load_policies(&db).await.unwrap();
        assert!(enforcer.check(7, "system:user:update").await);

        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(7))
            .exec(&db)
            .await
            .unwrap();
        enforcer.load_policies(&db).await.unwrap();
        assert!(!enforcer.check(7, "system:user:update").await);
    }
}
