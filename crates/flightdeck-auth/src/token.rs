//! JWT issue and validation.
//!
//! Tokens are HS256-signed with a shared secret from configuration. The
//! claims carry the full identity projection (id, username, role,
//! permissions) so a cache hit can authorize a request without touching
//! the repository.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use flightdeck_core::User;

use crate::error::AuthError;

/// Claims embedded in an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Durable user id.
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 JWT service.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_expiry_secs: u64,
}

impl JwtService {
    pub fn new(secret: &str, token_expiry_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            token_expiry_secs,
        }
    }

    /// Issue a token for a user with the configured expiry.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            permissions: user.permissions.clone(),
            iat: now,
            exp: now + self.token_expiry_secs as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::invalid_token(format!("Failed to encode token: {e}")))
    }

    /// Decode and validate a token, rejecting bad signatures and expiry.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::invalid_token(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User::new(
            "admin",
            "$argon2id$fake",
            "admin",
            vec!["view_flights".into(), "update_flights".into()],
        )
    }

    #[test]
    fn test_issue_and_decode_roundtrip() {
        let service = JwtService::new("test-secret", 3600);
        let user = sample_user();

        let token = service.issue(&user).unwrap();
        let claims = service.decode(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.permissions, user.permissions);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        let issuer = JwtService::new("secret-a", 3600);
        let verifier = JwtService::new("secret-b", 3600);

        let token = issuer.issue(&sample_user()).unwrap();
        let err = verifier.decode(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[test]
    fn test_decode_rejects_expired_token() {
        let service = JwtService::new("test-secret", 3600);
        let user = sample_user();

        // Mint a token whose expiry is an hour in the past, well beyond
        // the validator's default leeway.
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AccessClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            permissions: user.permissions.clone(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = service.decode(&token).unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let service = JwtService::new("test-secret", 3600);
        let err = service.decode("not.a.jwt").unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }
}
