/// Credit balances and purchase history
///
/// Consumption is a single conditional UPDATE, so concurrent executions of the same user
/// can never drive a balance below zero.

use crate::billing::bundles::CreditBundle;
use crate::database;
use anyhow::Result;
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, Row, SqliteConnection};

#[derive(Debug, Clone, Serialize)]
pub struct UserPurchase {
    pub id: String,
    pub bundle: String,
    pub credits: i64,
    pub amount_cents: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BalanceStorage {
    pool: SqlitePool,
}

impl BalanceStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the balance row for a new user (no-op if it exists)
    pub async fn open_account(&self, user_id: &str, initial_credits: i64) -> Result<()> {
        sqlx::query("INSERT INTO user_balance (user_id, credits) VALUES (?, ?) ON CONFLICT(user_id) DO NOTHING")
            .bind(user_id)
            .bind(initial_credits)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Current balance; users without a balance row have zero credits
    pub async fn get_credits(&self, user_id: &str) -> Result<i64> {
        let credits: Option<i64> = sqlx::query_scalar("SELECT credits FROM user_balance WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(credits.unwrap_or(0))
    }

    /// Add credits, creating the balance row if needed
    pub async fn add_credits(&self, user_id: &str, credits: i64) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO user_balance (user_id, credits) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET credits = credits + excluded.credits
            "#,
        )
        .bind(user_id)
        .bind(credits)
        .execute(&self.pool)
        .await?;

        self.get_credits(user_id).await
    }

    /// Atomically take `credits` from the balance; false when the balance is too low
    pub async fn try_consume(&self, user_id: &str, credits: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        consume(&mut conn, user_id, credits).await
    }

    /// Charge a node's credits and record the charge on its phase and execution
    ///
    /// All three writes commit together, so a phase with `credits_consumed` set has been paid
    /// for exactly once. Returns false, writing nothing, when the balance is too low.
    pub async fn charge_phase(
        &self,
        user_id: &str,
        execution_id: &str,
        phase_id: &str,
        credits: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !consume(&mut tx, user_id, credits).await? {
            return Ok(false);
        }

        sqlx::query("UPDATE execution_phases SET credits_consumed = ? WHERE id = ?")
            .bind(credits)
            .bind(phase_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE workflow_executions SET credits_consumed = credits_consumed + ? WHERE id = ?")
            .bind(credits)
            .bind(execution_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Grant a bundle's credits and record the purchase in one transaction
    pub async fn purchase_bundle(&self, user_id: &str, bundle: CreditBundle) -> Result<UserPurchase> {
        let purchase = UserPurchase {
            id: database::new_id(),
            bundle: bundle.as_str().to_string(),
            credits: bundle.credits(),
            amount_cents: bundle.price_cents(),
            created_at: database::now(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_balance (user_id, credits) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET credits = credits + excluded.credits
            "#,
        )
        .bind(user_id)
        .bind(purchase.credits)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_purchases (id, user_id, bundle, credits, amount_cents, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&purchase.id)
        .bind(user_id)
        .bind(&purchase.bundle)
        .bind(purchase.credits)
        .bind(purchase.amount_cents)
        .bind(&purchase.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(purchase)
    }

    /// Purchase history, newest first
    pub async fn list_purchases(&self, user_id: &str) -> Result<Vec<UserPurchase>> {
        let rows = sqlx::query(
            "SELECT id, bundle, credits, amount_cents, created_at FROM user_purchases WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UserPurchase {
                id: row.get("id"),
                bundle: row.get("bundle"),
                credits: row.get("credits"),
                amount_cents: row.get("amount_cents"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

async fn consume(conn: &mut SqliteConnection, user_id: &str, credits: i64) -> Result<bool> {
    if credits == 0 {
        return Ok(true);
    }

    let result = sqlx::query("UPDATE user_balance SET credits = credits - ? WHERE user_id = ? AND credits >= ?")
        .bind(credits)
        .bind(user_id)
        .bind(credits)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
