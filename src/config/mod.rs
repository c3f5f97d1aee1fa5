/// Configuration management for the UI-Butler backend
///
/// Handles server, database, auth, queue and billing parameters. Every value can be
/// overridden through a `BUTLER_*` environment variable (an optional `.env` file is
/// loaded first).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// JWT and cookie configuration
    pub auth: AuthConfig,
    /// Execution queue configuration
    pub queue: QueueConfig,
    /// Credit billing configuration
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL (e.g., "sqlite://data/butler.db" or "sqlite::memory:")
    pub url: String,
    /// Upper bound for pooled connections
    pub max_connections: u32,
}

/// Token signing and cookie settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for `Authentication` tokens
    pub access_token_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,
    /// HS256 secret for `Refresh` tokens
    pub refresh_token_secret: String,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,
    /// Adds the `Secure` attribute to auth cookies
    pub secure_cookies: bool,
    /// PBKDF2 iterations for newly hashed passwords
    pub password_rounds: u32,
}

/// Worker pool sizing for the execution queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of executions running at the same time
    pub concurrency: usize,
    /// Number of jobs buffered before `enqueue` waits
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Credits granted to every new account
    pub initial_credits: i64,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("BUTLER_HOST", "0.0.0.0".to_string()),
                port: env_or("BUTLER_PORT", 3000),
            },
            database: DatabaseConfig {
                url: env_or("BUTLER_DATABASE_URL", "sqlite://data/butler.db".to_string()),
                max_connections: env_or("BUTLER_DATABASE_MAX_CONNECTIONS", 5),
            },
            auth: AuthConfig {
                access_token_secret: env_or("BUTLER_JWT_ACCESS_SECRET", "dev-access-secret".to_string()),
                access_token_ttl_secs: env_or("BUTLER_JWT_ACCESS_TTL_SECS", 900),
                refresh_token_secret: env_or("BUTLER_JWT_REFRESH_SECRET", "dev-refresh-secret".to_string()),
                refresh_token_ttl_secs: env_or("BUTLER_JWT_REFRESH_TTL_SECS", 604_800),
                secure_cookies: env_or("BUTLER_SECURE_COOKIES", false),
                password_rounds: env_or("BUTLER_PASSWORD_ROUNDS", 600_000),
            },
            queue: QueueConfig {
                concurrency: env_or("BUTLER_QUEUE_CONCURRENCY", 5),
                capacity: env_or("BUTLER_QUEUE_CAPACITY", 1024),
            },
            billing: BillingConfig {
                initial_credits: env_or("BUTLER_INITIAL_CREDITS", 100),
            },
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { concurrency: 5, capacity: 1024 }
    }
}

/// Read and parse an environment variable, falling back on absence or parse failure
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring unparsable value for {}: {}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
