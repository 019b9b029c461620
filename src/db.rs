use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    DbErr, EntityTrait, PaginatorTrait, Schema, Set, Statement, TransactionTrait,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::menu::{self, MenuType};
use crate::entity::role::{RoleType, CODE_SUPER_ADMIN};
use crate::entity::{
    dept, job, job_log, login_log, now, role, role_menu, social_user, social_user_bind, tenant,
    tenant_package, user, user_role, CommonStatus,
};
use crate::error::{AppError, AppResult};
use crate::permission::role::insert_role;
use crate::permission::{perm, DataScope};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to {} database: {}:{}/{}", config.db_type, config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);
    if config.db_type == "postgres" {
        opt.set_schema_search_path("public");
    }

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Create every table that does not exist yet
pub async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    // Tenancy and RBAC
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(tenant_package::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(tenant::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(dept::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(role::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(menu::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user_role::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(role_menu::Entity)).await?;

    // Login support
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(login_log::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(social_user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(social_user_bind::Entity)).await?;

    // Jobs
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(job::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(job_log::Entity)).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();
    let sql = backend.build(&stmt);
    db.execute(Statement::from_string(backend, sql.to_string())).await?;
    Ok(())
}

pub const DEFAULT_TENANT_NAME: &str = "default";
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Navigation entries created on first start: (module, resource, name)
const SEED_MENUS: &[(&str, &str, &str)] = &[
    ("system", "user", "用户管理"),
    ("system", "role", "角色管理"),
    ("system", "menu", "菜单管理"),
    ("system", "tenant", "租户列表"),
    ("system", "tenant-package", "租户套餐"),
    ("system", "notice", "通知公告"),
    ("infra", "job", "定时任务"),
];

const SEED_DIRS: &[(&str, &str)] = &[("system", "系统管理"), ("infra", "基础设施")];

/// Menu resource a permission button hangs under
fn button_owner(permission: &str) -> Option<(&str, &str)> {
    let mut parts = permission.split(':');
    let module = parts.next()?;
    let resource = match parts.next()? {
        "permission" => "role",
        other => other,
    };
    Some((module, resource))
}

/// Seed the system tenant, its super admin and the menu tree on an empty database.
///
/// Returns false when the database already holds tenants.
pub async fn seed_defaults(db: &DatabaseConnection, bcrypt_cost: u32) -> AppResult<bool> {
    if tenant::Entity::find().count(db).await? > 0 {
        return Ok(false);
    }
    let password = bcrypt::hash(DEFAULT_ADMIN_PASSWORD, bcrypt_cost)
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))?;
    let now = now();
    let far_future = chrono::NaiveDate::from_ymd_opt(2099, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .ok_or_else(|| AppError::Internal("invalid tenant expiry".to_string()))?;

    let txn = db.begin().await?;
    let tenant = tenant::ActiveModel {
        name: Set(DEFAULT_TENANT_NAME.to_string()),
        contact_user_id: Set(None),
        contact_name: Set("管理员".to_string()),
        contact_mobile: Set(None),
        status: Set(CommonStatus::Enable.into()),
        websites: Set(String::new()),
        package_id: Set(tenant::PACKAGE_ID_SYSTEM),
        expire_time: Set(far_future),
        account_count: Set(9999),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let root_dept = dept::ActiveModel {
        tenant_id: Set(tenant.id),
        name: Set("总公司".to_string()),
        parent_id: Set(dept::ROOT_ID),
        sort: Set(0),
        status: Set(CommonStatus::Enable.into()),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let admin = user::ActiveModel {
        tenant_id: Set(tenant.id),
        username: Set(DEFAULT_ADMIN_USERNAME.to_string()),
        password: Set(password),
        nickname: Set("超级管理员".to_string()),
        remark: Set(String::new()),
        dept_id: Set(Some(root_dept.id)),
        avatar: Set(String::new()),
        status: Set(CommonStatus::Enable.into()),
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
        "超级管理员",
        CODE_SUPER_ADMIN,
        RoleType::System,
        DataScope::All,
    )
    .await?;
    user_role::new_binding(tenant.id, admin.id, role.id)
        .insert(&txn)
        .await?;

    let menus = seed_menus(&txn).await?;

    let mut active: tenant::ActiveModel = tenant.into();
    active.contact_user_id = Set(Some(admin.id));
    active.update(&txn).await?;
    txn.commit().await?;

    info!(
        "Seeded tenant '{}', user '{}' and {} menus",
        DEFAULT_TENANT_NAME, DEFAULT_ADMIN_USERNAME, menus
    );
    Ok(true)
}

async fn seed_menus<C: ConnectionTrait>(conn: &C) -> AppResult<usize> {
    let mut count = 0;
    for (dir_sort, (module, dir_name)) in SEED_DIRS.iter().enumerate() {
        let dir = insert_seed_menu(conn, menu::ROOT_ID, dir_name, "", MenuType::Dir, dir_sort as i32, &format!("/{}", module)).await?;
        count += 1;

        let children = SEED_MENUS.iter().filter(|(m, _, _)| m == module);
        for (sort, (_, resource, name)) in children.enumerate() {
            let page = insert_seed_menu(conn, dir.id, name, "", MenuType::Menu, sort as i32, resource).await?;
            count += 1;

            let buttons = perm::ALL
                .iter()
                .filter(|p| button_owner(p) == Some((*module, *resource)));
            for (sort, permission) in buttons.enumerate() {
                let action = permission.rsplit(':').next().unwrap_or(permission);
                insert_seed_menu(conn, page.id, action, permission, MenuType::Button, sort as i32, "").await?;
                count += 1;
            }
        }
    }
    Ok(count)
}

async fn insert_seed_menu<C: ConnectionTrait>(
    conn: &C,
    parent_id: i64,
    name: &str,
    permission: &str,
    menu_type: MenuType,
    sort: i32,
    path: &str,
) -> AppResult<menu::Model> {
    let now = now();
    let component = match menu_type {
        MenuType::Menu => format!("{}/index", path),
        _ => String::new(),
    };
    let menu = menu::ActiveModel {
        name: Set(name.to_string()),
        permission: Set(permission.to_string()),
        menu_type: Set(menu_type as i32),
        sort: Set(sort),
        parent_id: Set(parent_id),
        path: Set(path.to_string()),
        icon: Set(String::new()),
        component: Set(component),
        component_name: Set(String::new()),
        status: Set(CommonStatus::Enable.into()),
        visible: Set(true),
        keep_alive: Set(true),
        always_show: Set(true),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    Ok(menu)
}
