use std::any::Any;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, Select};
use serde::{Deserialize, Serialize};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::error::{AppResult, ErrorKind};
use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;
use crate::ws;

pub mod health;

/// API response envelope; `code` 0 means success
#[derive(Debug, Serialize)]
pub struct CommonResult<T: Serialize> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> CommonResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: String::new(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Handler return type
pub type ApiResult<T> = AppResult<Json<CommonResult<T>>>;

pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(CommonResult::success(data)))
}

/// One page of rows plus the unpaged total
#[derive(Debug, Serialize)]
pub struct PageResult<T> {
    pub list: Vec<T>,
    pub total: u64,
}

impl<T> PageResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            list: self.list.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParam {
    #[serde(default = "default_page_no")]
    pub page_no: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

fn default_page_no() -> u64 {
    1
}

fn default_page_size() -> u64 {
    10
}

impl Default for PageParam {
    fn default() -> Self {
        Self {
            page_no: default_page_no(),
            page_size: default_page_size(),
        }
    }
}

impl PageParam {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`
    pub fn size(&self) -> u64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Zero-based page index
    pub fn index(&self) -> u64 {
        self.page_no.saturating_sub(1)
    }
}

pub async fn fetch_page<E>(
    db: &DatabaseConnection,
    query: Select<E>,
    page: &PageParam,
) -> AppResult<PageResult<E::Model>>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let paginator = query.paginate(db, page.size());
    let total = paginator.num_items().await?;
    let list = paginator.fetch_page(page.index()).await?;
    Ok(PageResult { list, total })
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    let api_routes = Router::new()
        // Auth routes
        .route("/system/auth/login", post(handlers::auth::login))
        .route("/system/auth/sms-login", post(handlers::auth::sms_login))
        .route("/system/auth/social-login", post(handlers::auth::social_login))
        .route("/system/auth/refresh-token", post(handlers::auth::refresh_token))
        .route("/system/auth/logout", post(handlers::auth::logout))
        .route("/system/auth/register", post(handlers::auth::register))
        .route("/system/auth/reset-password", post(handlers::auth::reset_password))
        .route("/system/auth/send-sms-code", post(handlers::auth::send_sms_code))
        .route(
            "/system/auth/social-auth-redirect",
            get(handlers::auth::social_auth_redirect),
        )
        .route(
            "/system/auth/get-permission-info",
            get(handlers::auth::get_permission_info),
        )
        // Permission assignment routes
        .route(
            "/system/permission/assign-role-menu",
            post(handlers::permission::assign_role_menu),
        )
        .route(
            "/system/permission/assign-role-data-scope",
            post(handlers::permission::assign_role_data_scope),
        )
        .route(
            "/system/permission/assign-user-role",
            post(handlers::permission::assign_user_role),
        )
        .route(
            "/system/permission/list-role-menus",
            get(handlers::permission::list_role_menus),
        )
        .route(
            "/system/permission/list-user-roles",
            get(handlers::permission::list_user_roles),
        )
        // Role routes
        .route("/system/role/create", post(handlers::role::create_role))
        .route("/system/role/update", put(handlers::role::update_role))
        .route("/system/role/update-status", put(handlers::role::update_role_status))
        .route("/system/role/delete", delete(handlers::role::delete_role))
        .route("/system/role/get", get(handlers::role::get_role))
        .route("/system/role/list", get(handlers::role::list_roles))
        // Menu routes
        .route("/system/menu/create", post(handlers::menu::create_menu))
        .route("/system/menu/update", put(handlers::menu::update_menu))
        .route("/system/menu/delete", delete(handlers::menu::delete_menu))
        .route("/system/menu/get", get(handlers::menu::get_menu))
        .route("/system/menu/list", get(handlers::menu::list_menus))
        // User routes
        .route("/system/user/page", get(handlers::user::page_users))
        // Tenant routes
        .route("/system/tenant/create", post(handlers::tenant::create_tenant))
        .route("/system/tenant/update", put(handlers::tenant::update_tenant))
        .route("/system/tenant/delete", delete(handlers::tenant::delete_tenant))
        .route("/system/tenant/get", get(handlers::tenant::get_tenant))
        .route("/system/tenant/list", get(handlers::tenant::list_tenants))
        .route(
            "/system/tenant/get-id-by-name",
            get(handlers::tenant::get_tenant_id_by_name),
        )
        // Tenant package routes
        .route(
            "/system/tenant-package/create",
            post(handlers::tenant::create_package),
        )
        .route(
            "/system/tenant-package/update",
            put(handlers::tenant::update_package),
        )
        .route(
            "/system/tenant-package/delete",
            delete(handlers::tenant::delete_package),
        )
        .route("/system/tenant-package/get", get(handlers::tenant::get_package))
        .route("/system/tenant-package/list", get(handlers::tenant::list_packages))
        // Notice push
        .route("/system/notice/push", post(handlers::notice::push_notice))
        // Job routes
        .route("/infra/job/create", post(handlers::job::create_job))
        .route("/infra/job/update", put(handlers::job::update_job))
        .route("/infra/job/update-status", put(handlers::job::update_job_status))
        .route("/infra/job/delete", delete(handlers::job::delete_job))
        .route("/infra/job/trigger", put(handlers::job::trigger_job))
        .route("/infra/job/sync", post(handlers::job::sync_jobs))
        .route("/infra/job/get", get(handlers::job::get_job))
        .route("/infra/job/page", get(handlers::job::page_jobs))
        .route("/infra/job/get_next_times", get(handlers::job::get_next_times))
        // Job log routes
        .route("/infra/job-log/get", get(handlers::job::get_job_log))
        .route("/infra/job-log/page", get(handlers::job::page_job_logs));

    Router::new()
        .nest("/admin-api", api_routes)
        .route("/infra/ws", get(ws::upgrade))
        .route("/health", get(health::health_check))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> Json<CommonResult<()>> {
    Json(CommonResult::error(ErrorKind::NotFound.code(), "请求地址不存在"))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("Request handler panicked: {}", detail);
    let body = CommonResult::<()>::error(ErrorKind::Unknown.code(), "系统异常");
    (StatusCode::OK, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Value {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(app: &Router) -> String {
        let resp = call(
            app,
            Method::POST,
            "/admin-api/system/auth/login",
            None,
            Some(json!({"username": "admin", "password": "admin123", "tenantName": "default"})),
        )
        .await;
        assert_eq!(resp["code"], 0, "{}", resp);
        assert!(resp["data"]["refreshToken"].is_string());
        assert!(resp["data"]["expiresTime"].is_i64());
        resp["data"]["accessToken"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_page_param_bounds() {
        let page = PageParam {
            page_no: 0,
            page_size: 1000,
        };
        assert_eq!(page.index(), 0);
        assert_eq!(page.size(), MAX_PAGE_SIZE);
        let page = PageParam {
            page_no: 3,
            page_size: 0,
        };
        assert_eq!(page.index(), 2);
        assert_eq!(page.size(), 1);
    }

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(CommonResult::success(vec![1, 2])).unwrap();
        assert_eq!(ok, json!({"code": 0, "msg": "", "data": [1, 2]}));
        let err = serde_json::to_value(CommonResult::<()>::error(409, "x")).unwrap();
        assert_eq!(err, json!({"code": 409, "msg": "x"}));
    }

    #[tokio::test]
    async fn test_login_permission_info_logout() {
        let state = testing::test_state().await;
        let app = create_router(state);
        let token = login(&app).await;

        let info = call(&app, Method::GET, "/admin-api/system/auth/get-permission-info", Some(&token), None).await;
        assert_eq!(info["code"], 0, "{}", info);
        assert_eq!(info["data"]["roles"], json!(["super_admin"]));
        assert_eq!(info["data"]["user"]["id"], testing::ADMIN_USER_ID);
        assert!(info["data"]["permissions"]
            .as_array()
            .unwrap()
            .contains(&json!("infra:job:create")));
        assert!(!info["data"]["menus"].as_array().unwrap().is_empty());

        let out = call(&app, Method::POST, "/admin-api/system/auth/logout", Some(&token), None).await;
        assert_eq!(out["code"], 0);

        let again = call(&app, Method::GET, "/admin-api/system/auth/get-permission-info", Some(&token), None).await;
        assert_eq!(again["code"], 401);
    }

    #[tokio::test]
    async fn test_token_in_query_parameter() {
        let state = testing::test_state().await;
        let app = create_router(state);
        let token = login(&app).await;
        let uri = format!("/admin-api/system/auth/get-permission-info?Authorization={}", token);
        let info = call(&app, Method::GET, &uri, None, None).await;
        assert_eq!(info["code"], 0, "{}", info);
    }

    #[tokio::test]
    async fn test_missing_token_and_unknown_path() {
        let state = testing::test_state().await;
        let app = create_router(state);
        let resp = call(&app, Method::GET, "/admin-api/system/role/list", None, None).await;
        assert_eq!(resp["code"], 401);

        let token = login(&app).await;
        let resp = call(&app, Method::GET, "/admin-api/nowhere", Some(&token), None).await;
        assert_eq!(resp["code"], 404);

        let health = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(health["code"], 0);
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected() {
        let state = testing::test_state().await;
        let app = create_router(state);
        let token = login(&app).await;
        let resp = call(
            &app,
            Method::POST,
            "/admin-api/infra/job/create",
            Some(&token),
            Some(json!({
                "name": "bad",
                "handlerName": "jobLogCleanJob",
                "cronExpression": "bogus"
            })),
        )
        .await;
        assert_eq!(resp["code"], 400);
        assert!(resp["msg"].as_str().unwrap().starts_with("无效的 cron 表达式: "), "{}", resp);
    }

    #[tokio::test]
    async fn test_forbidden_without_permission() {
        let state = testing::test_state().await;
        testing::insert_user(&state.db, 1, "plain", None).await;
        let app = create_router(state);
        let resp = call(
            &app,
            Method::POST,
            "/admin-api/system/auth/login",
            None,
            Some(json!({"username": "plain", "password": testing::DEFAULT_PASSWORD})),
        )
        .await;
        let token = resp["data"]["accessToken"].as_str().unwrap().to_string();

        let resp = call(&app, Method::GET, "/admin-api/infra/job/page", Some(&token), None).await;
        assert_eq!(resp["code"], 403);
    }

    async fn boom() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panic_reported_as_unknown() {
        let app: Router = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response));
        let resp = call(&app, Method::GET, "/boom", None, None).await;
        assert_eq!(resp["code"], 500);
        assert_eq!(resp["msg"], "系统异常");
    }
}
