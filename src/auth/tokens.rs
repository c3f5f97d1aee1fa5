/// JWT issuing and verification plus the auth cookies that carry them
///
/// Access and refresh tokens are HS256 JWTs signed with separate secrets, so a refresh
/// token can never pass as an access token.

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::users::User;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ACCESS_COOKIE: &str = "Authentication";
pub const REFRESH_COOKIE: &str = "Refresh";

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    /// Expiry as a unix timestamp in seconds
    pub exp: u64,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenKeys {
    fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

pub struct TokenService {
    access: TokenKeys,
    refresh: TokenKeys,
    secure_cookies: bool,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl_secs", &self.access.ttl_secs)
            .field("refresh_ttl_secs", &self.refresh.ttl_secs)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: TokenKeys::new(&config.access_token_secret, config.access_token_ttl_secs),
            refresh: TokenKeys::new(&config.refresh_token_secret, config.refresh_token_ttl_secs),
            secure_cookies: config.secure_cookies,
        }
    }

    pub fn issue_access_token(&self, user: &User) -> AppResult<String> {
        issue(&self.access, user)
    }

    pub fn issue_refresh_token(&self, user: &User) -> AppResult<String> {
        issue(&self.refresh, user)
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<Claims> {
        verify(&self.access, token)
    }

    pub fn verify_refresh_token(&self, token: &str) -> AppResult<Claims> {
        verify(&self.refresh, token)
    }

    /// `Set-Cookie` value carrying an access token
    pub fn access_cookie(&self, token: &str) -> String {
        self.cookie(ACCESS_COOKIE, token, self.access.ttl_secs)
    }

    /// `Set-Cookie` value carrying a refresh token
    pub fn refresh_cookie(&self, token: &str) -> String {
        self.cookie(REFRESH_COOKIE, token, self.refresh.ttl_secs)
    }

    /// `Set-Cookie` values that expire both auth cookies
    pub fn cleared_cookies(&self) -> [String; 2] {
        [self.cookie(ACCESS_COOKIE, "", 0), self.cookie(REFRESH_COOKIE, "", 0)]
    }

    fn cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}", name, value, max_age);
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

fn issue(keys: &TokenKeys, user: &User) -> AppResult<String> {
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp: unix_now() + keys.ttl_secs,
    };

    encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
}

fn verify(keys: &TokenKeys, token: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(token, &keys.decoding, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("🔒 Rejected token: {}", e);
            AppError::Unauthenticated("Invalid or expired token".to_string())
        })
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
