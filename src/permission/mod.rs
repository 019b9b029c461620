//! RBAC: role to menu resolution, access checks, tenant packages and data scope

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::entity::menu::{self, MenuTree};

pub mod data_scope;
pub mod enforcer;
pub mod menus;
pub mod role;
pub mod service;
pub mod tenant;

pub use data_scope::{DataPermission, DataScope, QueryScope, ScopedEntity, ScopedQuery};
pub use enforcer::PermissionEnforcer;
pub use service::PermissionService;

/// Permission strings checked by the HTTP layer
pub mod perm {
    pub const ASSIGN_ROLE_MENU: &str = "system:permission:assign-role-menu";
    pub const ASSIGN_ROLE_DATA_SCOPE: &str = "system:permission:assign-role-data-scope";
    pub const ASSIGN_USER_ROLE: &str = "system:permission:assign-user-role";

    pub const ROLE_QUERY: &str = "system:role:query";
    pub const ROLE_CREATE: &str = "system:role:create";
    pub const ROLE_UPDATE: &str = "system:role:update";
    pub const ROLE_DELETE: &str = "system:role:delete";

    pub const MENU_QUERY: &str = "system:menu:query";
    pub const MENU_CREATE: &str = "system:menu:create";
    pub const MENU_UPDATE: &str = "system:menu:update";
    pub const MENU_DELETE: &str = "system:menu:delete";

    pub const USER_QUERY: &str = "system:user:query";

    pub const TENANT_QUERY: &str = "system:tenant:query";
    pub const TENANT_CREATE: &str = "system:tenant:create";
    pub const TENANT_UPDATE: &str = "system:tenant:update";
    pub const TENANT_DELETE: &str = "system:tenant:delete";

    pub const PACKAGE_QUERY: &str = "system:tenant-package:query";
    pub const PACKAGE_CREATE: &str = "system:tenant-package:create";
    pub const PACKAGE_UPDATE: &str = "system:tenant-package:update";
    pub const PACKAGE_DELETE: &str = "system:tenant-package:delete";

    pub const JOB_QUERY: &str = "infra:job:query";
    pub const JOB_CREATE: &str = "infra:job:create";
    pub const JOB_UPDATE: &str = "infra:job:update";
    pub const JOB_DELETE: &str = "infra:job:delete";
    pub const JOB_TRIGGER: &str = "infra:job:trigger";

    pub const NOTICE_UPDATE: &str = "system:notice:update";

    /// Every permission above, used to seed the menu tree
    pub const ALL: &[&str] = &[
        ASSIGN_ROLE_MENU,
        ASSIGN_ROLE_DATA_SCOPE,
        ASSIGN_USER_ROLE,
        ROLE_QUERY,
        ROLE_CREATE,
        ROLE_UPDATE,
        ROLE_DELETE,
        MENU_QUERY,
        MENU_CREATE,
        MENU_UPDATE,
        MENU_DELETE,
        USER_QUERY,
        TENANT_QUERY,
        TENANT_CREATE,
        TENANT_UPDATE,
        TENANT_DELETE,
        PACKAGE_QUERY,
        PACKAGE_CREATE,
        PACKAGE_UPDATE,
        PACKAGE_DELETE,
        JOB_QUERY,
        JOB_CREATE,
        JOB_UPDATE,
        JOB_DELETE,
        JOB_TRIGGER,
        NOTICE_UPDATE,
    ];
}

/// Current user summary returned with the permission info
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionUser {
    pub id: i64,
    pub nickname: String,
    pub avatar: String,
    pub dept_id: Option<i64>,
}

/// 登录用户的权限信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub user: PermissionUser,
    /// Role codes
    pub roles: Vec<String>,
    pub permissions: BTreeSet<String>,
    pub menus: Vec<MenuTree>,
}

/// Build the navigation tree from a flat menu list.
///
/// Buttons are excluded. Siblings are ordered by `(sort, id)` and nodes whose
/// parent is not in the list are dropped.
pub fn build_menu_tree(menus: Vec<menu::Model>) -> Vec<MenuTree> {
    let mut menus: Vec<menu::Model> = menus.into_iter().filter(|m| !m.is_button()).collect();
    menus.sort_by_key(|m| (m.sort, m.id));

    let mut by_parent: HashMap<i64, Vec<MenuTree>> = HashMap::new();
    for m in menus {
        by_parent.entry(m.parent_id).or_default().push(MenuTree::from(m));
    }
    attach_children(menu::ROOT_ID, &mut by_parent)
}

fn attach_children(parent_id: i64, by_parent: &mut HashMap<i64, Vec<MenuTree>>) -> Vec<MenuTree> {
    let mut nodes = by_parent.remove(&parent_id).unwrap_or_default();
    for node in &mut nodes {
        node.children = attach_children(node.id, by_parent);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::menu::MenuType;

    fn menu(id: i64, parent_id: i64, sort: i32, menu_type: MenuType) -> menu::Model {
        let now = crate::entity::now();
        menu::Model {
            id,
            name: format!("m{}", id),
            permission: String::new(),
            menu_type: menu_type as i32,
            sort,
            parent_id,
            path: String::new(),
            icon: String::new(),
            component: String::new(),
            component_name: String::new(),
            status: 0,
            visible: true,
            keep_alive: true,
            always_show: true,
            create_time: now,
            update_time: now,
            deleted: false,
        }
    }

    #[test]
    fn test_build_menu_tree() {
        let tree = build_menu_tree(vec![
            menu(1, 0, 2, MenuType::Dir),
            menu(2, 0, 1, MenuType::Dir),
            menu(3, 1, 0, MenuType::Menu),
            menu(4, 3, 0, MenuType::Button),
            menu(5, 99, 0, MenuType::Menu),
        ]);

        let roots: Vec<i64> = tree.iter().map(|m| m.id).collect();
        assert_eq!(roots, vec![2, 1]);
        assert_eq!(tree[1].children.len(), 1);
        assert_eq!(tree[1].children[0].id, 3);
        assert!(tree[1].children[0].children.is_empty());
    }

    #[test]
    fn test_permission_constants_unique() {
        let unique: BTreeSet<&str> = perm::ALL.iter().copied().collect();
        assert_eq!(unique.len(), perm::ALL.len());
    }
}
