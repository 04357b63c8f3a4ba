//! Users, password digests and sessions.
//!
//! Passwords are stored as `{salt}${hex(HMAC-SHA256(salt, password))}` with a
//! random per-user salt. Sessions are random tokens kept in the `sessions`
//! table and carried in a cookie (or an `Authorization: Bearer` header).
//! [`CurrentUser`] is the axum extractor that turns either into an identity.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{ReviewError, Result};
use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

const MAX_USERNAME_LEN: usize = 80;

fn digest(salt: &str, password: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|e| ReviewError::Internal(e.to_string()))?;
    mac.update(password.as_bytes());
    Ok(mac)
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = Uuid::new_v4().simple().to_string();
    let mac = digest(&salt, password)?;
    Ok(format!("{}${}", salt, hex::encode(mac.finalize().into_bytes())))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };
    match digest(salt, password) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

pub async fn create_user(pool: &SqlitePool, username: &str, password: &str) -> Result<i64> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ReviewError::MissingParameter("username"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ReviewError::BadRequest(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if password.is_empty() {
        return Err(ReviewError::MissingParameter("password"));
    }

    // The UNIQUE constraint is the duplicate check.
    let result = sqlx::query("INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)")
        .bind(username)
        .bind(hash_password(password)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ReviewError::BadRequest("Username already exists".to_string())
            }
            other => ReviewError::Database(other),
        })?;

    tracing::info!(username, "user created");
    Ok(result.last_insert_rowid())
}

/// Check a username/password pair.
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> Result<SessionUser> {
    let row = sqlx::query("SELECT id, username, password_hash FROM users WHERE username = ?")
        .bind(username.trim())
        .fetch_optional(pool)
        .await?;

    let invalid = || ReviewError::Unauthorized("Invalid username or password".to_string());
    let row = row.ok_or_else(invalid)?;
    let stored: String = row.get("password_hash");
    if !verify_password(password, &stored) {
        return Err(invalid());
    }

    Ok(SessionUser {
        user_id: row.get("id"),
        username: row.get("username"),
    })
}

pub async fn create_session(pool: &SqlitePool, user_id: i64, ttl_hours: i64) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let token = Uuid::new_v4().simple().to_string();

    sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(now)
        .bind(now.saturating_add(ttl_secs(ttl_hours)))
        .execute(pool)
        .await?;

    Ok(token)
}

pub async fn session_user(pool: &SqlitePool, token: &str) -> Result<Option<SessionUser>> {
    let row = sqlx::query(
        "SELECT u.id, u.username FROM sessions s JOIN users u ON u.id = s.user_id \
         WHERE s.token = ? AND s.expires_at > ?",
    )
    .bind(token)
    .bind(chrono::Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SessionUser {
        user_id: r.get("id"),
        username: r.get("username"),
    }))
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Pull the session token from the named cookie, falling back to a bearer
/// token.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            if let Some((name, token)) = pair.trim().split_once('=') {
                if name == cookie_name && !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn ttl_secs(ttl_hours: i64) -> i64 {
    ttl_hours.saturating_mul(3600)
}

pub fn session_cookie(cookie_name: &str, token: &str, ttl_hours: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        cookie_name,
        token,
        ttl_secs(ttl_hours)
    )
}

pub fn clear_cookie(cookie_name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", cookie_name)
}

/// Extractor for handlers that require a logged-in user. Rejects with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ReviewError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or_else(|| ReviewError::Unauthorized("login required".to_string()))?;

        session_user(&state.pool, &token)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| ReviewError::Unauthorized("session expired or invalid".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_password_roundtrip() {
        let stored = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("x", "no-separator"));
        assert!(!verify_password("x", "salt$not-hex"));
    }

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; review_session=abc123"),
        );
        assert_eq!(
            session_token(&headers, "review_session").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_huge_ttl_saturates() {
        assert_eq!(ttl_secs(i64::MAX), i64::MAX);
        assert!(session_cookie("review_session", "t", i64::MAX)
            .ends_with(&format!("Max-Age={}", i64::MAX)));
    }

    #[test]
    fn test_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(session_token(&headers, "review_session").as_deref(), Some("tok"));
        assert_eq!(session_token(&HeaderMap::new(), "review_session"), None);
    }
}
