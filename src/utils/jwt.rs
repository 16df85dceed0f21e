use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // storefront user id
    pub exp: i64,
    pub iat: i64,
    pub token_type: String, // "access"
}

/// 仅校验店铺前台签发的访问令牌；签发逻辑保留给测试与本地调试
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expires_in: i64,
}

impl JwtService {
    pub fn new(secret: &str, access_expires_in: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expires_in: access_expires_in,
        }
    }

    pub fn generate_access_token(&self, user_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_expires_in);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            token_type: "access".to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AppError::JwtError)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AppError::JwtError)
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        let claims = self.verify_token(token)?;

        if claims.token_type != "access" {
            return Err(AppError::NotAuthenticated);
        }
        if claims.sub.trim().is_empty() {
            return Err(AppError::NotAuthenticated);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_round_trip() {
        let jwt = JwtService::new("secret", 3600);
        let token = jwt.generate_access_token("user-42").unwrap();
        let claims = jwt.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = JwtService::new("a", 3600)
            .generate_access_token("user-42")
            .unwrap();
        let err = JwtService::new("b", 3600)
            .verify_access_token(&token)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::PlayErrorKind::NotAuthenticated);
    }

    #[test]
    fn test_empty_subject_is_not_authenticated() {
        let jwt = JwtService::new("secret", 3600);
        let token = jwt.generate_access_token("  ").unwrap();
        assert!(matches!(
            jwt.verify_access_token(&token),
            Err(AppError::NotAuthenticated)
        ));
    }
}
