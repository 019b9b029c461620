//! Menu management

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use tracing::info;

use super::tenant::package_menu_ids;
use super::PermissionService;
use crate::entity::menu::{self, MenuType};
use crate::entity::{now, role_menu, CommonStatus};
use crate::error::{AppError, AppResult, OptionExt};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuSaveRequest {
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub permission: String,
    #[serde(rename = "type")]
    pub menu_type: i32,
    #[serde(default)]
    pub sort: i32,
    #[serde(default)]
    pub parent_id: i64,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub component_name: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub keep_alive: bool,
    #[serde(default = "default_true")]
    pub always_show: bool,
}

fn default_true() -> bool {
    true
}

impl PermissionService {
    async fn validate_menu(&self, id: Option<i64>, req: &MenuSaveRequest) -> AppResult<()> {
        if req.name.trim().is_empty() {
            return Err(AppError::param("菜单名称不能为空"));
        }
        MenuType::try_from(req.menu_type)
            .map_err(|t| AppError::param(format!("无效的菜单类型: {}", t)))?;

        if req.parent_id != menu::ROOT_ID {
            if Some(req.parent_id) == id {
                return Err(AppError::param("不能设置自己为父菜单"));
            }
            let parent = self.get_menu(req.parent_id).await.map_err(|e| match e {
                AppError::NotFound(_) => AppError::not_found("父菜单不存在"),
                other => other,
            })?;
            if parent.is_button() {
                return Err(AppError::param("父菜单的类型必须是目录或者菜单"));
            }
        }

        let sibling = menu::Entity::find()
            .filter(menu::Column::ParentId.eq(req.parent_id))
            .filter(menu::Column::Name.eq(req.name.as_str()))
            .filter(menu::Column::Deleted.eq(false))
            .one(&self.db)
            .await?;
        if matches!(sibling, Some(m) if Some(m.id) != id) {
            return Err(AppError::conflict("已经存在该名字的菜单"));
        }
        Ok(())
    }

    pub async fn create_menu(&self, req: MenuSaveRequest) -> AppResult<i64> {
        self.validate_menu(None, &req).await?;
        let now = now();
        let has_permission = !req.permission.is_empty();
        let menu = menu::ActiveModel {
            name: Set(req.name),
            permission: Set(req.permission),
            menu_type: Set(req.menu_type),
            sort: Set(req.sort),
            parent_id: Set(req.parent_id),
            path: Set(req.path),
            icon: Set(req.icon),
            component: Set(req.component),
            component_name: Set(req.component_name),
            status: Set(req.status),
            visible: Set(req.visible),
            keep_alive: Set(req.keep_alive),
            always_show: Set(req.always_show),
            create_time: Set(now),
            update_time: Set(now),
            deleted: Set(false),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        info!("Menu created: {} ({})", menu.name, menu.id);

        // new menus show up for super admins
        if has_permission {
            self.invalidate().await?;
        }
        Ok(menu.id)
    }

    pub async fn update_menu(&self, req: MenuSaveRequest) -> AppResult<()> {
        let id = req.id.ok_or_else(|| AppError::param("菜单编号不能为空"))?;
        let menu = self.get_menu(id).await?;
        self.validate_menu(Some(id), &req).await?;

        let affects_access = menu.permission != req.permission || menu.status != req.status;
        let mut active: menu::ActiveModel = menu.into();
        active.name = Set(req.name);
        active.permission = Set(req.permission);
        active.menu_type = Set(req.menu_type);
        active.sort = Set(req.sort);
        active.parent_id = Set(req.parent_id);
        active.path = Set(req.path);
        active.icon = Set(req.icon);
        active.component = Set(req.component);
        active.component_name = Set(req.component_name);
        active.status = Set(req.status);
        active.visible = Set(req.visible);
        active.keep_alive = Set(req.keep_alive);
        active.always_show = Set(req.always_show);
        active.update_time = Set(now());
        active.update(&self.db).await?;

        if affects_access {
            self.invalidate().await?;
        } else {
            self.invalidate_info();
        }
        Ok(())
    }

    /// Soft delete together with its role bindings
    pub async fn delete_menu(&self, id: i64) -> AppResult<()> {
        let menu = self.get_menu(id).await?;
        let children = menu::Entity::find()
            .filter(menu::Column::ParentId.eq(id))
            .filter(menu::Column::Deleted.eq(false))
            .count(&self.db)
            .await?;
        if children > 0 {
            return Err(AppError::conflict("存在子菜单，无法删除"));
        }

        let txn = self.db.begin().await?;
        let mut active: menu::ActiveModel = menu.into();
        active.deleted = Set(true);
        active.update_time = Set(now());
        active.update(&txn).await?;
        role_menu::Entity::delete_many()
            .filter(role_menu::Column::MenuId.eq(id))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!("Menu deleted: {}", id);
        self.invalidate().await
    }

    pub async fn get_menu(&self, id: i64) -> AppResult<menu::Model> {
        menu::Entity::find_by_id(id)
            .filter(menu::Column::Deleted.eq(false))
            .one(&self.db)
            .await?
            .ok_or_not_found("菜单不存在")
    }

    /// Menus visible to the tenant, optionally only enabled ones
    pub async fn list_menus(&self, tenant_id: i64, enabled_only: bool) -> AppResult<Vec<menu::Model>> {
        let mut query = menu::Entity::find().filter(menu::Column::Deleted.eq(false));
        if enabled_only {
            query = query.filter(menu::Column::Status.eq(i32::from(CommonStatus::Enable)));
        }
        let mut menus = query
            .order_by_asc(menu::Column::Sort)
            .order_by_asc(menu::Column::Id)
            .all(&self.db)
            .await?;
        if let Some(package) = package_menu_ids(&self.db, tenant_id).await? {
            menus.retain(|m| package.contains(&m.id));
        }
        Ok(menus)
    }
}
