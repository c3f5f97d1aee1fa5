/// SQLite pool setup and schema management
///
/// One database holds every table: users, balances, purchases, workflows, executions and
/// their phases. Timestamps are stored as RFC 3339 UTC strings so they sort lexically.

use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Open the configured database, creating the file (and its directory) when missing
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    if config.url.contains(":memory:") {
        return connect_in_memory().await;
    }

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| anyhow::anyhow!("Invalid database url '{}': {}", config.url, e))?
        .create_if_missing(true);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            tracing::info!("📁 Ensuring database directory exists: {}", parent.display());
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create database directory '{}': {}", parent.display(), e))?;
        }
    }

    tracing::info!("🗄️ Opening database: {}", options.get_filename().display());
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Private in-memory database on a single pinned connection
///
/// Every SQLite connection to `:memory:` is a separate database, so the pool must never
/// open a second one or recycle the first.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes (safe to call repeatedly)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    const STATEMENTS: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            refresh_token_hash TEXT,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_balance (
            user_id TEXT PRIMARY KEY,
            credits INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_purchases (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            bundle TEXT NOT NULL,
            credits INTEGER NOT NULL,
            amount_cents INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            definition JSON NOT NULL,
            status TEXT NOT NULL,
            credits_cost INTEGER NOT NULL DEFAULT 0,
            execution_plan JSON,
            last_run_id TEXT,
            last_run_status TEXT,
            last_run_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, name)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS workflow_executions (
            id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            status TEXT NOT NULL,
            credits_consumed INTEGER NOT NULL DEFAULT 0,
            claimed INTEGER NOT NULL DEFAULT 0,
            definition JSON NOT NULL,
            error TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS execution_phases (
            id TEXT PRIMARY KEY,
            execution_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            number INTEGER NOT NULL,
            node_id TEXT NOT NULL,
            task_type TEXT NOT NULL,
            node JSON NOT NULL,
            status TEXT NOT NULL,
            credits_consumed INTEGER,
            inputs JSON,
            outputs JSON,
            error TEXT,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_workflows_user ON workflows(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_executions_workflow ON workflow_executions(workflow_id)",
        "CREATE INDEX IF NOT EXISTS idx_executions_user_started ON workflow_executions(user_id, started_at)",
        "CREATE INDEX IF NOT EXISTS idx_executions_status ON workflow_executions(status)",
        "CREATE INDEX IF NOT EXISTS idx_phases_execution ON execution_phases(execution_id, number)",
        "CREATE INDEX IF NOT EXISTS idx_purchases_user ON user_purchases(user_id)",
    ];

    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Current time as a sortable RFC 3339 UTC string
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Fresh random identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
