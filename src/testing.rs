//! Shared fixtures for unit tests

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db;
use crate::entity::role::RoleType;
use crate::entity::{dept, menu, now, role, role_menu, tenant, user, user_role, CommonStatus};
use crate::job::builtin_handlers;
use crate::permission::DataScope;
use crate::state::AppState;

/// Seeded admin account
pub const ADMIN_USER_ID: i64 = 1;
/// Password of every user created by [`insert_user`]
pub const DEFAULT_PASSWORD: &str = "secret-pw";

const BCRYPT_COST: u32 = 4;

/// Empty, migrated in-memory database
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    db::auto_migrate(&db).await.unwrap();
    db
}

/// In-memory database holding the default tenant, admin and menus
pub async fn seeded_db() -> DatabaseConnection {
    let db = memory_db().await;
    db::seed_defaults(&db, BCRYPT_COST).await.unwrap();
    db
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.bcrypt_cost = BCRYPT_COST;
    config.jwt.secret = "unit-test-secret-unit-test-secret".to_string();
    config.default_tenant_id = 1;
    config
}

pub async fn test_state() -> AppState {
    test_state_with(test_config()).await
}

pub async fn test_state_with(config: Config) -> AppState {
    let db = seeded_db().await;
    let handlers = builtin_handlers(&db).unwrap();
    AppState::build(db, config, Arc::new(MemoryCache::new()), handlers)
        .await
        .unwrap()
}

pub async fn insert_user(
    db: &DatabaseConnection,
    tenant_id: i64,
    username: &str,
    dept_id: Option<i64>,
) -> user::Model {
    new_user(tenant_id, username, dept_id, None).insert(db).await.unwrap()
}

pub async fn insert_user_created_by(
    db: &DatabaseConnection,
    tenant_id: i64,
    username: &str,
    creator: i64,
) -> user::Model {
    new_user(tenant_id, username, None, Some(creator))
        .insert(db)
        .await
        .unwrap()
}

fn new_user(
    tenant_id: i64,
    username: &str,
    dept_id: Option<i64>,
    creator: Option<i64>,
) -> user::ActiveModel {
    let now = now();
    user::ActiveModel {
        tenant_id: Set(tenant_id),
        username: Set(username.to_string()),
        password: Set(bcrypt::hash(DEFAULT_PASSWORD, BCRYPT_COST).unwrap()),
        nickname: Set(username.to_string()),
        remark: Set(String::new()),
        dept_id: Set(dept_id),
        email: Set(None),
        mobile: Set(None),
        avatar: Set(String::new()),
        status: Set(CommonStatus::Enable.into()),
        login_ip: Set(None),
        login_date: Set(None),
        creator: Set(creator),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
}

pub async fn insert_dept(
    db: &DatabaseConnection,
    tenant_id: i64,
    parent_id: i64,
    name: &str,
) -> dept::Model {
    let now = now();
    dept::ActiveModel {
        tenant_id: Set(tenant_id),
        name: Set(name.to_string()),
        parent_id: Set(parent_id),
        sort: Set(0),
        leader_user_id: Set(None),
        status: Set(CommonStatus::Enable.into()),
        creator: Set(None),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// A button when `permission` is set, a plain menu otherwise
pub async fn insert_menu(
    db: &DatabaseConnection,
    parent_id: i64,
    name: &str,
    permission: &str,
) -> menu::Model {
    let now = now();
    let menu_type = if permission.is_empty() {
        menu::MenuType::Menu
    } else {
        menu::MenuType::Button
    };
    menu::ActiveModel {
        name: Set(name.to_string()),
        permission: Set(permission.to_string()),
        menu_type: Set(menu_type as i32),
        sort: Set(0),
        parent_id: Set(parent_id),
        path: Set(String::new()),
        icon: Set(String::new()),
        component: Set(String::new()),
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
    .insert(db)
    .await
    .unwrap()
}

/// Enabled custom role named after its code
pub async fn insert_role(
    db: &DatabaseConnection,
    tenant_id: i64,
    code: &str,
    data_scope: i32,
) -> role::Model {
    let scope = DataScope::try_from(data_scope).unwrap();
    crate::permission::role::insert_role(db, tenant_id, code, code, RoleType::Custom, scope)
        .await
        .unwrap()
}

pub async fn bind_role_menu(db: &DatabaseConnection, tenant_id: i64, role_id: i64, menu_id: i64) {
    role_menu::new_binding(tenant_id, role_id, menu_id)
        .insert(db)
        .await
        .unwrap();
}

pub async fn bind_user_role(db: &DatabaseConnection, tenant_id: i64, user_id: i64, role_id: i64) {
    user_role::new_binding(tenant_id, user_id, role_id)
        .insert(db)
        .await
        .unwrap();
}

/// Enabled tenant that expires far in the future
pub async fn insert_tenant(db: &DatabaseConnection, name: &str, package_id: i64) -> tenant::Model {
    let now = now();
    tenant::ActiveModel {
        name: Set(name.to_string()),
        contact_user_id: Set(None),
        contact_name: Set(name.to_string()),
        contact_mobile: Set(None),
        status: Set(CommonStatus::Enable.into()),
        websites: Set(String::new()),
        package_id: Set(package_id),
        expire_time: Set(now + chrono::Duration::days(365)),
        account_count: Set(100),
        creator: Set(None),
        create_time: Set(now),
        update_time: Set(now),
        deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// Poll `probe` until it yields a value; panics once `timeout` has passed
pub async fn eventually<T, F, Fut>(timeout: Duration, probe: F) -> T
where
    F: Fn() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
