//! ABOUTME: Authentication utilities for password hashing and session tokens
//! ABOUTME: Argon2 password verification plus HS256 tokens carried in the session cookie

use crate::models::Claims;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use sd_core::{Error, Result};
use sd_db::User;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Name of the HTTP-only cookie holding the session token
pub const SESSION_COOKIE: &str = "session";

/// Password hashing utilities
pub struct PasswordAuth;

impl PasswordAuth {
    /// Hash a password using Argon2
    #[instrument(skip(password))]
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("Failed to hash password: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a hash
    #[instrument(skip(password, hash))]
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("Invalid password hash format: {}", e)))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(_) => {
                debug!("Password verification failed");
                Ok(false)
            }
        }
    }
}

/// Signs and verifies session tokens
#[derive(Clone)]
pub struct SessionTokens {
    secret: String,
    ttl_secs: u64,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("secret", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl SessionTokens {
    pub fn new(secret: impl Into<String>, ttl_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: ttl_hours * 60 * 60,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a token for `user`
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn issue(&self, user: &User) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Config(format!("Time error: {}", e)))?
            .as_secs() as usize;

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            branch_id: user.branch_id.clone(),
            exp: now + self.ttl_secs as usize,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| Error::Config(format!("Failed to create session token: {}", e)))
    }

    /// Verify signature and expiry
    #[instrument(skip(self, token))]
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| Error::Unauthorized(format!("Invalid session token: {}", e)))
    }

    /// HTTP-only cookie carrying `token`
    pub fn cookie(&self, token: String, secure: bool) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .max_age(CookieDuration::seconds(self.ttl_secs as i64))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .finish()
    }

    /// Expired cookie that makes the browser drop the session
    pub fn removal_cookie(secure: bool) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .finish();
        cookie.make_removal();
        cookie
    }
}
