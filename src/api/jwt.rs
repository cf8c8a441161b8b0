use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const SESSION_TOKEN_TYPE: &str = "session";

/// Global cached JwtService instance
static JWT_SERVICE: OnceLock<JwtService> = OnceLock::new();

/// Get the cached JwtService instance
///
/// Uses OnceLock for thread-safe lazy initialization.
/// The service is initialized once on first use and reused for all subsequent requests.
pub fn get_jwt_service() -> &'static JwtService {
    JWT_SERVICE.get_or_init(JwtService::from_config)
}

/// Session Token Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// user id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

/// JWT Service for generating and validating session tokens
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_days: u64,
}

impl JwtService {
    pub fn new(secret: &str, session_days: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            session_days,
        }
    }

    /// Create JwtService from config
    pub fn from_config() -> Self {
        let config = crate::config::get_config();

        // 获取 JWT secret，如果为空则生成一个安全的随机值
        let jwt_secret = Some(config.auth.jwt_secret.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                use tracing::warn;
                warn!("JWT secret not configured or empty, generating secure random token");
                crate::utils::generate_secure_token(32)
            });

        Self::new(&jwt_secret, config.auth.session_days)
    }

    pub fn session_days(&self) -> u64 {
        self.session_days
    }

    /// Generate a session token for a user
    pub fn generate_session_token(&self, user_id: i32) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(self.session_days as i64)).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: SESSION_TOKEN_TYPE.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Validate a session token (signature, expiry, type)
    pub fn validate_session_token(
        &self,
        token: &str,
    ) -> Result<SessionClaims, jsonwebtoken::errors::Error> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())?;

        // Verify token type
        if token_data.claims.token_type != SESSION_TOKEN_TYPE {
            return Err(jsonwebtoken::errors::Error::from(
                jsonwebtoken::errors::ErrorKind::InvalidToken,
            ));
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> JwtService {
        JwtService::new("test_secret_key_32_bytes_long!!", 7)
    }

    #[test]
    fn test_generate_and_validate_session_token() {
        let service = create_test_service();
        let token = service.generate_session_token(42).unwrap();
        let claims = service.validate_session_token(&token).unwrap();

        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.token_type, "session");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tokens_are_unique() {
        let service = create_test_service();
        let a = service.generate_session_token(1).unwrap();
        let b = service.generate_session_token(1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let service = create_test_service();
        assert!(service.validate_session_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service1 = JwtService::new("secret_one_32_bytes_long_enough!", 7);
        let service2 = JwtService::new("secret_two_32_bytes_long_enough!", 7);

        let token = service1.generate_session_token(3).unwrap();
        assert!(service2.validate_session_token(&token).is_err());
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let service = create_test_service();
        let now = Utc::now();
        let claims = SessionClaims {
            sub: "1".to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(1)).timestamp(),
            jti: "x".to_string(),
            token_type: "refresh".to_string(),
        };
        let token = encode(&Header::default(), &claims, &service.encoding_key).unwrap();
        assert!(service.validate_session_token(&token).is_err());
    }
}
