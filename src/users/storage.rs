/// SQLite persistence for user accounts

use crate::database;
use anyhow::Result;
use serde::Serialize;
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
}

/// Account plus the secrets needed to authenticate it
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
    pub refresh_token_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserStorage {
    pool: SqlitePool,
}

impl UserStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new account; emails are stored lowercased
    pub async fn create_user(&self, email: &str, name: &str, password_hash: &str) -> Result<User> {
        let user = User {
            id: database::new_id(),
            email: email.trim().to_lowercase(),
            name: name.to_string(),
            created_at: database::now(),
        };

        sqlx::query("INSERT INTO users (id, email, name, password_hash, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(password_hash)
            .bind(&user.created_at)
            .execute(&self.pool)
            .await?;

        tracing::info!("👤 Created user {}", user.id);
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query(
            "SELECT id, email, name, created_at, password_hash, refresh_token_hash FROM users WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(credentials_from_row))
    }

    pub async fn get_credentials(&self, id: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query(
            "SELECT id, email, name, created_at, password_hash, refresh_token_hash FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(credentials_from_row))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.get_credentials(id).await?.map(|credentials| credentials.user))
    }

    /// Store (or clear, on logout) the digest of the user's current refresh token
    pub async fn set_refresh_token_hash(&self, id: &str, hash: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET refresh_token_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn credentials_from_row(row: &SqliteRow) -> UserCredentials {
    UserCredentials {
        user: User {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        },
        password_hash: row.get("password_hash"),
        refresh_token_hash: row.get("refresh_token_hash"),
    }
}
