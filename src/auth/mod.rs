//! User accounts, sessions and favorites.
//!
//! Accounts live in the `users` table next to the content they bookmark.
//! Login hands out an access/refresh JWT pair (see [`security`]); the HTTP
//! layer resolves a bearer access token to a [`User`] with
//! [`AuthService::authenticate`].
//!
//! Password reset and email verification use single-use random tokens with
//! an expiry (1 hour and 24 hours). There is no mail transport: the link that
//! would be sent is written to the log at `info` level. Requests for an
//! unknown email succeed without doing anything so callers cannot learn
//! which addresses are registered.

pub mod favorites;
pub mod security;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::AuthConfig;
use crate::models::{now_utc, ts_to_datetime};

pub use security::{TokenIssuer, TokenKind, TokenPair};

const RESET_TOKEN_TTL_HOURS: i64 = 1;
const VERIFY_TOKEN_TTL_HOURS: i64 = 24;

const USER_COLUMNS: &str = "id, username, email, nickname, avatar_url, bio, email_verified, created_at";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username already exists")]
    UsernameTaken,

    #[error("email already exists")]
    EmailTaken,

    #[error("invalid username or password")]
    InvalidCredentials,

    /// Bearer or refresh token missing, malformed, expired or of the wrong kind.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("invalid or expired reset token")]
    InvalidResetToken,

    #[error("invalid or expired verification token")]
    InvalidVerifyToken,

    #[error("user not found")]
    UserNotFound,

    #[error("favorite not found")]
    FavoriteNotFound,

    #[error("content is already a favorite")]
    FavoriteExists,

    #[error("{0}")]
    Invalid(String),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.into())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}

/// Public view of an account. The password hash and one-time tokens never
/// leave the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub email_verified: bool,
    pub created_at: chrono::DateTime<Utc>,
}

fn row_to_user(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        nickname: row.get("nickname"),
        avatar_url: row.get("avatar_url"),
        bio: row.get("bio"),
        email_verified: row.get::<i64, _>("email_verified") != 0,
        created_at: ts_to_datetime(row.get("created_at")),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

/// Shallow shape check: one `@` with a non-empty local part and a dotted
/// domain.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || security::hash_password(&password))
        .await
        .map_err(|e| AuthError::Storage(e.into()))?
        .map_err(AuthError::from)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || security::verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Storage(e.into()))
}

/// Account operations over the shared SQLite pool.
pub struct AuthService {
    pool: SqlitePool,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(pool: SqlitePool, config: &AuthConfig) -> Self {
        Self {
            pool,
            tokens: TokenIssuer::from_config(config),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Create an account. Username and email are unique; the database
    /// constraint decides, so concurrent registrations cannot both win.
    pub async fn register(&self, req: &RegisterRequest) -> Result<User> {
        let username = req.username.trim();
        let email = req.email.trim();
        if username.is_empty() {
            return Err(AuthError::Invalid("username must not be empty".into()));
        }
        if !is_plausible_email(email) {
            return Err(AuthError::Invalid(format!("invalid email address: {}", email)));
        }
        if req.password.is_empty() {
            return Err(AuthError::Invalid("password must not be empty".into()));
        }

        let password_hash = hash_blocking(req.password.clone()).await?;
        let now = now_utc().timestamp();
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(username)
            .bind(email)
            .bind(&password_hash)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await;

        match row {
            Ok(row) => {
                let user = row_to_user(&row);
                tracing::info!(user_id = user.id, username = %user.username, "user registered");
                Ok(user)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                if e.message().contains("users.email") {
                    Err(AuthError::EmailTaken)
                } else {
                    Err(AuthError::UsernameTaken)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials and issue a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let id: i64 = row.get("id");
        let hash: String = row.get("password_hash");
        if !verify_blocking(password.to_string(), hash).await? {
            tracing::debug!(username, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.tokens.issue_pair(id)?)
    }

    /// Trade a refresh token for a fresh pair. Old refresh tokens stay valid
    /// until they expire.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let id = self
            .tokens
            .verify(refresh_token, TokenKind::Refresh)
            .ok_or(AuthError::InvalidToken)?;
        let user = self.user(id).await?;
        Ok(self.tokens.issue_pair(user.id)?)
    }

    /// Resolve an access token to its user.
    pub async fn authenticate(&self, access_token: &str) -> Result<User> {
        let id = self
            .tokens
            .verify(access_token, TokenKind::Access)
            .ok_or(AuthError::InvalidToken)?;
        self.user(id).await
    }

    pub async fn user(&self, id: i64) -> Result<User> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_user(&row))
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<User> {
        let sql = format!(
            "UPDATE users SET nickname = COALESCE(?, nickname), \
             avatar_url = COALESCE(?, avatar_url), bio = COALESCE(?, bio), updated_at = ? \
             WHERE id = ? RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&update.nickname)
            .bind(&update.avatar_url)
            .bind(&update.bio)
            .bind(now_utc().timestamp())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row_to_user(&row))
            .ok_or(AuthError::UserNotFound)
    }

    /// Store a reset token for `email` and log the confirmation link.
    ///
    /// Returns the token when the address belongs to an account and `None`
    /// otherwise; callers answering over HTTP must not reveal which.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let token = security::random_token();
        let expires = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
        let row = sqlx::query(
            "UPDATE users SET reset_token = ?, reset_token_expire = ?, updated_at = ? \
             WHERE email = ? RETURNING id",
        )
        .bind(&token)
        .bind(expires.timestamp())
        .bind(now_utc().timestamp())
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let user_id: i64 = row.get("id");
            tracing::info!(
                user_id,
                link = %format!("/api/v1/auth/password/reset/confirm?token={}", token),
                "password reset requested"
            );
            token
        }))
    }

    /// Set a new password with a reset token. The token is consumed in the
    /// same statement that checks it.
    pub async fn confirm_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(AuthError::Invalid("password must not be empty".into()));
        }
        let password_hash = hash_blocking(new_password.to_string()).await?;
        let row = sqlx::query(
            "UPDATE users SET password_hash = ?, reset_token = NULL, reset_token_expire = NULL, \
             updated_at = ? WHERE reset_token = ? AND reset_token_expire >= ? RETURNING id",
        )
        .bind(&password_hash)
        .bind(now_utc().timestamp())
        .bind(token)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidResetToken)?;

        let user_id: i64 = row.get("id");
        tracing::info!(user_id, "password reset");
        Ok(())
    }

    /// Store a verification token for `email` and log the confirmation link.
    /// Same return contract as [`Self::request_password_reset`].
    pub async fn request_email_verification(&self, email: &str) -> Result<Option<String>> {
        let token = security::random_token();
        let expires = Utc::now() + Duration::hours(VERIFY_TOKEN_TTL_HOURS);
        let row = sqlx::query(
            "UPDATE users SET email_verify_token = ?, email_verify_expire = ?, updated_at = ? \
             WHERE email = ? RETURNING id",
        )
        .bind(&token)
        .bind(expires.timestamp())
        .bind(now_utc().timestamp())
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let user_id: i64 = row.get("id");
            tracing::info!(
                user_id,
                link = %format!("/api/v1/auth/email/verify/confirm?token={}", token),
                "email verification requested"
            );
            token
        }))
    }

    pub async fn confirm_email_verification(&self, token: &str) -> Result<()> {
        let row = sqlx::query(
            "UPDATE users SET email_verified = 1, email_verify_token = NULL, \
             email_verify_expire = NULL, updated_at = ? \
             WHERE email_verify_token = ? AND email_verify_expire >= ? RETURNING id",
        )
        .bind(now_utc().timestamp())
        .bind(token)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::InvalidVerifyToken)?;

        let user_id: i64 = row.get("id");
        tracing::info!(user_id, "email verified");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    pub(crate) async fn service(tmp: &TempDir) -> AuthService {
        let path = tmp.path().join("auth.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let config = AuthConfig {
            jwt_secret: "unit-test-secret".into(),
            ..AuthConfig::default()
        };
        AuthService::new(pool, &config)
    }

    pub(crate) fn alice() -> RegisterRequest {
        RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "correct horse".into(),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;

        let user = auth.register(&alice()).await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(!user.email_verified);
        assert!(user.nickname.is_none());

        let pair = auth.login("alice", "correct horse").await.unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(auth.authenticate(&pair.access_token).await.unwrap(), user);

        assert!(matches!(
            auth.login("alice", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("bob", "correct horse").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        auth.register(&alice()).await.unwrap();

        let same_name = RegisterRequest {
            email: "other@example.com".into(),
            ..alice()
        };
        assert!(matches!(
            auth.register(&same_name).await,
            Err(AuthError::UsernameTaken)
        ));

        let same_email = RegisterRequest {
            username: "alice2".into(),
            ..alice()
        };
        assert!(matches!(
            auth.register(&same_email).await,
            Err(AuthError::EmailTaken)
        ));

        for bad in ["", "no-at-sign", "a@b", "@example.com", "a b@example.com"] {
            let req = RegisterRequest {
                username: "carol".into(),
                email: bad.into(),
                password: "pw".into(),
            };
            assert!(
                matches!(auth.register(&req).await, Err(AuthError::Invalid(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_refresh_and_token_kinds() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        auth.register(&alice()).await.unwrap();
        let pair = auth.login("alice", "correct horse").await.unwrap();

        let renewed = auth.refresh(&pair.refresh_token).await.unwrap();
        assert!(auth.authenticate(&renewed.access_token).await.is_ok());

        assert!(matches!(
            auth.refresh(&pair.access_token).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.authenticate(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_token_for_missing_user() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        let token = auth.tokens().issue(999, TokenKind::Access).unwrap();
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_keeps_unset_fields() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        let user = auth.register(&alice()).await.unwrap();

        let first = ProfileUpdate {
            nickname: Some("Al".into()),
            bio: Some("likes convex functions".into()),
            ..Default::default()
        };
        auth.update_profile(user.id, &first).await.unwrap();

        let second = ProfileUpdate {
            avatar_url: Some("https://example.com/a.png".into()),
            ..Default::default()
        };
        let updated = auth.update_profile(user.id, &second).await.unwrap();
        assert_eq!(updated.nickname.as_deref(), Some("Al"));
        assert_eq!(updated.bio.as_deref(), Some("likes convex functions"));
        assert_eq!(updated.avatar_url.as_deref(), Some("https://example.com/a.png"));

        assert!(matches!(
            auth.update_profile(999, &second).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        auth.register(&alice()).await.unwrap();

        assert!(auth
            .request_password_reset("nobody@example.com")
            .await
            .unwrap()
            .is_none());

        let token = auth
            .request_password_reset("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            auth.confirm_password_reset("wrong-token", "new pw").await,
            Err(AuthError::InvalidResetToken)
        ));

        auth.confirm_password_reset(&token, "new pw").await.unwrap();
        assert!(auth.login("alice", "new pw").await.is_ok());
        assert!(auth.login("alice", "correct horse").await.is_err());

        // Single use.
        assert!(matches!(
            auth.confirm_password_reset(&token, "again").await,
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_expired_reset_token_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        auth.register(&alice()).await.unwrap();
        let token = auth
            .request_password_reset("alice@example.com")
            .await
            .unwrap()
            .unwrap();

        sqlx::query("UPDATE users SET reset_token_expire = ?")
            .bind(Utc::now().timestamp() - 1)
            .execute(&auth.pool)
            .await
            .unwrap();

        assert!(matches!(
            auth.confirm_password_reset(&token, "new pw").await,
            Err(AuthError::InvalidResetToken)
        ));
        assert!(auth.login("alice", "correct horse").await.is_ok());
    }

    #[tokio::test]
    async fn test_email_verification_flow() {
        let tmp = TempDir::new().unwrap();
        let auth = service(&tmp).await;
        let user = auth.register(&alice()).await.unwrap();

        let token = auth
            .request_email_verification("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            auth.confirm_email_verification("nope").await,
            Err(AuthError::InvalidVerifyToken)
        ));
        auth.confirm_email_verification(&token).await.unwrap();
        assert!(auth.user(user.id).await.unwrap().email_verified);

        assert!(matches!(
            auth.confirm_email_verification(&token).await,
            Err(AuthError::InvalidVerifyToken)
        ));
    }
}
