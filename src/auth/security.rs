//! Password hashing, signed session tokens and one-time tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are HS256
//! JWTs whose `type` claim distinguishes access from refresh tokens, so one
//! can never stand in for the other.

use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {}", e))
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    kind: TokenKind,
    exp: i64,
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Issues and checks HS256 session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_minutes),
            Duration::days(config.refresh_token_days),
        )
    }

    pub fn issue(&self, user_id: i64, kind: TokenKind) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            kind,
            exp: (Utc::now() + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenKind::Access)?,
            refresh_token: self.issue(user_id, TokenKind::Refresh)?,
            token_type: "bearer".to_string(),
        })
    }

    /// The user id in `token` if it is valid, unexpired and of `kind`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Option<i64> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).ok()?;
        if data.claims.kind != kind {
            return None;
        }
        data.claims.sub.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::minutes(5), Duration::days(1))
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() {
        let pair = issuer().issue_pair(42).unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(issuer().verify(&pair.access_token, TokenKind::Access), Some(42));
        assert_eq!(issuer().verify(&pair.refresh_token, TokenKind::Refresh), Some(42));
        assert_eq!(issuer().verify(&pair.access_token, TokenKind::Refresh), None);
        assert_eq!(issuer().verify(&pair.refresh_token, TokenKind::Access), None);
    }

    #[test]
    fn test_rejects_expired_and_foreign_tokens() {
        let expired = TokenIssuer::new("test-secret", Duration::minutes(-10), Duration::days(1));
        let token = expired.issue(1, TokenKind::Access).unwrap();
        assert_eq!(issuer().verify(&token, TokenKind::Access), None);

        let other = TokenIssuer::new("other-secret", Duration::minutes(5), Duration::days(1));
        let token = other.issue(1, TokenKind::Access).unwrap();
        assert_eq!(issuer().verify(&token, TokenKind::Access), None);
        assert_eq!(issuer().verify("garbage", TokenKind::Access), None);
    }

    #[test]
    fn test_random_token_shape() {
        let a = random_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, random_token());
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
