//! Authentication handlers

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, Uri},
    response::Json,
    Extension,
};
use serde::Deserialize;

use crate::auth::service::{
    LoginRequest, RegisterRequest, ResetPasswordRequest, SendSmsCodeRequest, SmsLoginRequest,
    SocialLoginRequest,
};
use crate::auth::{ClientInfo, LoginUser, TokenBundle};
use crate::middleware::request_token;
use crate::permission::PermissionInfo;
use crate::routes::{success, ApiResult};
use crate::state::AppState;

/// Caller address and agent from proxy headers
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let ip = header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .or_else(|| header_value("x-real-ip"))
        .unwrap_or_default();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    ClientInfo { ip, user_agent }
}

/// POST /system/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<TokenBundle> {
    success(state.auth.login(req, &client_info(&headers)).await?)
}

/// POST /system/auth/sms-login
pub async fn sms_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SmsLoginRequest>,
) -> ApiResult<TokenBundle> {
    success(state.auth.sms_login(req, &client_info(&headers)).await?)
}

/// POST /system/auth/social-login
pub async fn social_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SocialLoginRequest>,
) -> ApiResult<TokenBundle> {
    success(state.auth.social_login(req, &client_info(&headers)).await?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenQuery {
    pub refresh_token: String,
}

/// POST /system/auth/refresh-token?refreshToken=...
pub async fn refresh_token(
    State(state): State<AppState>,
    Query(query): Query<RefreshTokenQuery>,
) -> ApiResult<TokenBundle> {
    success(state.auth.refresh(&query.refresh_token).await?)
}

/// POST /system/auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> ApiResult<bool> {
    if let Some(token) = request_token(&headers, &uri) {
        state.auth.logout(&token, &client_info(&headers)).await?;
    }
    success(true)
}

/// POST /system/auth/register
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<TokenBundle> {
    success(state.auth.register(req, &client_info(&headers)).await?)
}

/// POST /system/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<bool> {
    state.auth.reset_password(req).await?;
    success(true)
}

/// POST /system/auth/send-sms-code
pub async fn send_sms_code(
    State(state): State<AppState>,
    Json(req): Json<SendSmsCodeRequest>,
) -> ApiResult<bool> {
    state.auth.send_sms_code(req).await?;
    success(true)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialRedirectQuery {
    #[serde(rename = "type")]
    pub social_type: i32,
    pub redirect_uri: String,
}

/// GET /system/auth/social-auth-redirect?type=...&redirectUri=...
pub async fn social_auth_redirect(
    State(state): State<AppState>,
    Query(query): Query<SocialRedirectQuery>,
) -> ApiResult<String> {
    success(
        state
            .auth
            .social_authorize_url(query.social_type, &query.redirect_uri)?,
    )
}

/// GET /system/auth/get-permission-info
pub async fn get_permission_info(
    State(state): State<AppState>,
    Extension(user): Extension<LoginUser>,
) -> ApiResult<PermissionInfo> {
    let info = state.perm.get_permission_info(&user).await?;
    success(info.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));
        let client = client_info(&headers);
        assert_eq!(client.ip, "10.0.0.1");
        assert_eq!(client.user_agent, "curl/8");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.9"));
        assert_eq!(client_info(&headers).ip, "192.168.1.9");
        assert_eq!(client_info(&HeaderMap::new()).ip, "");
    }
}
