use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::routes::CommonResult;

/// Stable error kinds exposed to API clients
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Param,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    BadCredentials,
    SocialNotBound,
    Unknown,
}

impl ErrorKind {
    /// Envelope code for this kind
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Param => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Unknown => 500,
            ErrorKind::BadCredentials => 1_002_000_000,
            ErrorKind::SocialNotBound => 1_002_000_005,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Param(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("登录失败，账号密码不正确")]
    BadCredentials,

    #[error("未绑定账号，需要进行绑定")]
    SocialNotBound,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn param(msg: impl Into<String>) -> Self {
        AppError::Param(msg.into())
    }

    pub fn unauthorized() -> Self {
        AppError::Unauthorized("账号未登录".to_string())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("没有该操作权限".to_string())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Param(_) | AppError::Json(_) => ErrorKind::Param,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::BadCredentials => ErrorKind::BadCredentials,
            AppError::SocialNotBound => ErrorKind::SocialNotBound,
            AppError::Internal(_) | AppError::Database(_) | AppError::Cache(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Message that is safe to hand to API clients
    pub fn client_message(&self) -> String {
        match self {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "系统异常".to_string()
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                "系统异常".to_string()
            }
            AppError::Cache(err) => {
                tracing::error!("Cache error: {}", err);
                "系统异常".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = CommonResult::<()>::error(self.kind().code(), self.client_message());
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

/// Helper to convert anyhow errors to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<casbin::Error> for AppError {
    fn from(err: casbin::Error) -> Self {
        AppError::Internal(format!("casbin: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::param("x").kind().code(), 400);
        assert_eq!(AppError::unauthorized().kind().code(), 401);
        assert_eq!(AppError::BadCredentials.kind().code(), 1_002_000_000);
        assert_eq!(AppError::SocialNotBound.kind(), ErrorKind::SocialNotBound);
        assert_eq!(
            AppError::Database(sea_orm::DbErr::Custom("boom".into())).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_internal_message_is_masked() {
        let err = AppError::Internal("secret detail".to_string());
        assert_eq!(err.client_message(), "系统异常");
        let err = AppError::conflict("角色编码已存在");
        assert_eq!(err.client_message(), "角色编码已存在");
    }

    #[test]
    fn test_error_response_is_enveloped() {
        let response = AppError::not_found("User not found").into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("Item not found");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
