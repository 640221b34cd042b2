//! Password hashing and session-token primitives.
//!
//! Tokens are self-contained HS256 JWTs carrying `{sub, email, iat, exp}`.
//! There is no server-side revocation list: a token stays valid until it
//! expires or its subject is deleted, and rotating the signing secret
//! invalidates every outstanding token at once.

use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::models::Claims;

/// Cookie holding the session token; checked before the Authorization header.
pub const TOKEN_COOKIE: &str = "authToken";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("hashing task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Hash a password with bcrypt at the given cost. The hash is CPU-bound for
/// hundreds of milliseconds at cost 12, so it runs off the async runtime.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AuthError> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

/// Check a password against a stored bcrypt hash.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

/// Minimum strength policy: at least 8 characters with one letter and one
/// digit.
pub fn password_meets_policy(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Process-wide signing keys plus the fixed token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Issue a token for the given user, expiring after the configured TTL.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

/// Pull the session token out of a request: the `authToken` cookie wins,
/// then a `Bearer` Authorization header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{TOKEN_COOKIE}=");
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(raw) = cookie_header.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            if let Some(value) = pair.trim().strip_prefix(&prefix) {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}
