/// SQLite persistence layer for workflow storage
///
/// Workflows are scoped to their owner: every read and write filters on `user_id`.
/// Definitions and plans are stored as JSON columns next to indexed lookup fields.

use crate::database;
use crate::workflow::plan::ExecutionPlan;
use crate::workflow::types::{Workflow, WorkflowDefinition, WorkflowStatus, WorkflowSummary};
use anyhow::Result;
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row,
};

#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new draft workflow with an empty definition
    pub async fn create_workflow(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Workflow> {
        let now = database::now();
        let workflow = Workflow {
            id: database::new_id(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            definition: WorkflowDefinition::default(),
            status: WorkflowStatus::Draft,
            credits_cost: 0,
            execution_plan: None,
            last_run_id: None,
            last_run_status: None,
            last_run_at: None,
            created_at: now.clone(),
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO workflows (id, user_id, name, description, definition, status, credits_cost, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.user_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(serde_json::to_string(&workflow.definition)?)
        .bind(workflow.status.as_str())
        .bind(&workflow.created_at)
        .bind(&workflow.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(workflow)
    }

    /// Check whether the user already owns a workflow with this name
    pub async fn name_exists(&self, user_id: &str, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM workflows WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Retrieve a workflow owned by the user
    pub async fn get_workflow(&self, user_id: &str, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| workflow_from_row(&row)).transpose()
    }

    /// List the user's workflows, most recently updated first
    pub async fn list_workflows(&self, user_id: &str) -> Result<Vec<WorkflowSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, status, credits_cost, last_run_id, last_run_status,
                   last_run_at, created_at, updated_at
            FROM workflows WHERE user_id = ? ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            workflows.push(WorkflowSummary {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                status: status.parse()?,
                credits_cost: row.get("credits_cost"),
                last_run_id: row.get("last_run_id"),
                last_run_status: row.get("last_run_status"),
                last_run_at: row.get("last_run_at"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(workflows)
    }

    /// Replace the definition of a draft workflow; false when no draft matched
    pub async fn update_definition(
        &self,
        user_id: &str,
        id: &str,
        definition: &WorkflowDefinition,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflows SET definition = ?, updated_at = ?
            WHERE id = ? AND user_id = ? AND status = 'DRAFT'
            "#,
        )
        .bind(serde_json::to_string(definition)?)
        .bind(database::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Freeze a workflow with its validated plan and cost
    pub async fn publish(
        &self,
        user_id: &str,
        id: &str,
        plan: &ExecutionPlan,
        credits_cost: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflows SET status = 'PUBLISHED', execution_plan = ?, credits_cost = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(serde_json::to_string(plan)?)
        .bind(credits_cost)
        .bind(database::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Return a workflow to draft, dropping its frozen plan
    pub async fn unpublish(&self, user_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflows SET status = 'DRAFT', execution_plan = NULL, credits_cost = 0, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(database::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remember the latest execution on the workflow row
    pub async fn record_last_run(&self, id: &str, execution_id: &str, status: &str) -> Result<()> {
        sqlx::query(
            "UPDATE workflows SET last_run_id = ?, last_run_status = ?, last_run_at = ? WHERE id = ?",
        )
        .bind(execution_id)
        .bind(status)
        .bind(database::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a workflow together with its executions and phases
    pub async fn delete_workflow(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM workflows WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "DELETE FROM execution_phases WHERE execution_id IN (SELECT id FROM workflow_executions WHERE workflow_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM workflow_executions WHERE workflow_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

fn workflow_from_row(row: &SqliteRow) -> Result<Workflow> {
    let definition: String = row.get("definition");
    let plan: Option<String> = row.get("execution_plan");
    let status: String = row.get("status");

    Ok(Workflow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        definition: serde_json::from_str(&definition)?,
        status: status.parse()?,
        credits_cost: row.get("credits_cost"),
        execution_plan: plan.map(|raw| serde_json::from_str(&raw)).transpose()?,
        last_run_id: row.get("last_run_id"),
        last_run_status: row.get("last_run_status"),
        last_run_at: row.get("last_run_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
