//! JWT signing and verification (HS256)

use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{LoginUser, UserType};
use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub user_type: i32,
    pub tenant_id: i64,
    pub nickname: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    /// Unique token id, keeps tokens minted within the same second distinct
    pub jti: String,
}

impl Claims {
    pub fn login_user(&self) -> AppResult<LoginUser> {
        let user_type = UserType::try_from(self.user_type).map_err(|_| AppError::unauthorized())?;
        Ok(LoginUser {
            user_id: self.user_id,
            user_type,
            tenant_id: self.tenant_id,
            nickname: self.nickname.clone(),
        })
    }
}

#[derive(Clone)]
pub struct JwtManager {
    issuer: String,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl JwtManager {
    pub fn new(config: &JwtConfig) -> Self {
        if config.secret.len() < 32 {
            tracing::warn!("JWT secret is shorter than recommended (32 bytes)");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = 0;

        Self {
            issuer: config.issuer.clone(),
            encoding_key: Arc::new(EncodingKey::from_secret(config.secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(config.secret.as_bytes())),
            validation: Arc::new(validation),
        }
    }

    /// Mint a token for the identity, valid for `ttl_secs` from now
    pub fn sign(&self, user: &LoginUser, ttl_secs: i64) -> AppResult<(String, Claims)> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: user.user_id,
            user_type: user.user_type.into(),
            tenant_id: user.tenant_id,
            nickname: user.nickname.clone(),
            iat: now,
            exp: now + ttl_secs,
            iss: self.issuer.clone(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))?;
        Ok((token, claims))
    }

    /// Verify signature, issuer and expiration
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AppError::unauthorized()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(secret: &str) -> JwtManager {
        JwtManager::new(&JwtConfig {
            secret: secret.to_string(),
            ..JwtConfig::default()
        })
    }

    fn admin() -> LoginUser {
        LoginUser {
            user_id: 1,
            user_type: UserType::Admin,
            tenant_id: 1,
            nickname: "芋道源码".to_string(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let jwt = manager("0123456789abcdef0123456789abcdef");
        let (token, claims) = jwt.sign(&admin(), 3600).unwrap();
        assert_eq!(claims.iss, "yudao-go");

        let parsed = jwt.verify(&token).unwrap();
        assert_eq!(parsed, claims);
        assert_eq!(parsed.login_user().unwrap(), admin());
    }

    #[test]
    fn test_tokens_are_unique() {
        let jwt = manager("0123456789abcdef0123456789abcdef");
        let (a, _) = jwt.sign(&admin(), 3600).unwrap();
        let (b, _) = jwt.sign(&admin(), 3600).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_expired_token_rejected() {
        let jwt = manager("0123456789abcdef0123456789abcdef");
        let (token, _) = jwt.sign(&admin(), -10).unwrap();
        assert!(matches!(jwt.verify(&token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = manager("0123456789abcdef0123456789abcdef")
            .sign(&admin(), 3600)
            .unwrap();
        let other = manager("fedcba9876543210fedcba9876543210");
        assert!(other.verify(&token).is_err());
        assert!(other.verify("not-a-token").is_err());
    }
}
