//! Authentication middleware
//!
//! Resolves the bearer token of every non-public request into a
//! [`LoginUser`] stored in the request extensions.

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::LoginUser;
use crate::error::AppError;
use crate::state::AppState;

const API_PREFIX: &str = "/admin-api";

/// Paths reachable without a token
fn is_public_path(path: &str) -> bool {
    // The upgrade endpoint checks its own `token` parameter
    if path == "/health" || path == "/infra/ws" {
        return true;
    }
    let Some(path) = path.strip_prefix(API_PREFIX) else {
        return false;
    };
    matches!(
        path,
        "/system/auth/login"
            | "/system/auth/sms-login"
            | "/system/auth/social-login"
            | "/system/auth/refresh-token"
            | "/system/auth/logout"
            | "/system/auth/register"
            | "/system/auth/reset-password"
            | "/system/auth/send-sms-code"
            | "/system/auth/social-auth-redirect"
            | "/system/tenant/get-id-by-name"
    )
}

/// Token from `Authorization: Bearer ...`, falling back to `?Authorization=...`
pub fn request_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|t| !t.is_empty());
    if from_header.is_some() {
        return from_header;
    }
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params
        .get("Authorization")
        .map(|t| t.strip_prefix("Bearer ").unwrap_or(t).trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(token) = request_token(request.headers(), request.uri()) else {
        return AppError::unauthorized().into_response();
    };

    let user: LoginUser = match state.auth.validate(&token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!("Rejected token on {}: {}", request.uri().path(), e);
            return e.into_response();
        }
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/admin-api/system/auth/login"));
        assert!(is_public_path("/admin-api/system/auth/logout"));
        assert!(is_public_path("/infra/ws"));
        assert!(is_public_path("/health"));
        assert!(!is_public_path("/admin-api/system/auth/get-permission-info"));
        assert!(!is_public_path("/admin-api/infra/job/page"));
        assert!(!is_public_path("/system/auth/login"));
    }

    #[test]
    fn test_request_token_sources() {
        let mut headers = HeaderMap::new();
        let uri: Uri = "/admin-api/x?Authorization=from-query".parse().unwrap();
        assert_eq!(request_token(&headers, &uri).as_deref(), Some("from-query"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(request_token(&headers, &uri).as_deref(), Some("from-header"));

        let bare: Uri = "/admin-api/x".parse().unwrap();
        assert_eq!(request_token(&HeaderMap::new(), &bare), None);
    }
}
