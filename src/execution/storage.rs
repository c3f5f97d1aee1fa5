/// SQLite persistence for executions and their phases
///
/// Status changes are single UPDATE statements. A worker claims a PENDING execution before
/// running it and is the only writer until it releases the claim; the API only flips
/// RUNNING/PENDING <-> WAITING_FOR_APPROVAL.

use crate::database;
use crate::execution::types::{
    ExecutionPhase, ExecutionStatus, ExecutionTrigger, PhaseStatus, WorkflowExecution,
};
use crate::workflow::{plan::ExecutionPlan, types::WorkflowDefinition};
use anyhow::Result;
use serde_json::Value;
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row, SqliteConnection,
};

#[derive(Debug, Clone)]
pub struct ExecutionStorage {
    pool: SqlitePool,
}

impl ExecutionStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a PENDING execution with one CREATED phase per planned node
    pub async fn create_execution(
        &self,
        workflow_id: &str,
        user_id: &str,
        trigger: ExecutionTrigger,
        definition: &WorkflowDefinition,
        plan: &ExecutionPlan,
    ) -> Result<WorkflowExecution> {
        let execution = WorkflowExecution {
            id: database::new_id(),
            workflow_id: workflow_id.to_string(),
            user_id: user_id.to_string(),
            trigger,
            status: ExecutionStatus::Pending,
            credits_consumed: 0,
            definition: definition.clone(),
            error: None,
            created_at: database::now(),
            started_at: None,
            completed_at: None,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, user_id, trigger_type, status, credits_consumed, definition, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(&execution.user_id)
        .bind(execution.trigger.as_str())
        .bind(execution.status.as_str())
        .bind(serde_json::to_string(definition)?)
        .bind(&execution.created_at)
        .execute(&mut *tx)
        .await?;

        for phase in plan {
            for node in &phase.nodes {
                sqlx::query(
                    r#"
                    INSERT INTO execution_phases
                        (id, execution_id, user_id, number, node_id, task_type, node, status)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(database::new_id())
                .bind(&execution.id)
                .bind(user_id)
                .bind(i64::from(phase.phase))
                .bind(&node.id)
                .bind(node.task_type.as_str())
                .bind(serde_json::to_string(node)?)
                .bind(PhaseStatus::Created.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(execution)
    }

    pub async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| execution_from_row(&row)).transpose()
    }

    /// Execution lookup that hides other users' runs
    pub async fn get_execution_for_user(&self, user_id: &str, id: &str) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| execution_from_row(&row)).transpose()
    }

    pub async fn get_status(&self, id: &str) -> Result<Option<ExecutionStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM workflow_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        status.map(|s| s.parse()).transpose()
    }

    /// Phases in execution order
    pub async fn get_phases(&self, execution_id: &str) -> Result<Vec<ExecutionPhase>> {
        let rows = sqlx::query(
            "SELECT * FROM execution_phases WHERE execution_id = ? ORDER BY number ASC, rowid ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(phase_from_row).collect()
    }

    /// The user's executions of one workflow, newest first
    pub async fn list_for_workflow(&self, user_id: &str, workflow_id: &str) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE workflow_id = ? AND user_id = ? ORDER BY created_at DESC",
        )
        .bind(workflow_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(execution_from_row).collect()
    }

    /// Executions waiting for a worker, oldest first
    pub async fn list_pending(&self) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE status = 'PENDING' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(execution_from_row).collect()
    }

    /// Put executions interrupted by a shutdown back to PENDING
    ///
    /// Only called at startup, when no worker can still hold a claim.
    pub async fn requeue_interrupted(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE workflow_executions SET status = 'PENDING' WHERE status = 'RUNNING'")
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE workflow_executions SET claimed = 0 WHERE claimed = 1")
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE execution_phases SET status = 'PENDING' WHERE status = 'RUNNING'")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Claim a PENDING execution for one worker and move it to RUNNING
    ///
    /// started_at is stamped on the first run only. Returns false when the execution is not
    /// PENDING or another worker still holds it.
    pub async fn claim(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'RUNNING', claimed = 1, started_at = COALESCE(started_at, ?)
            WHERE id = ? AND status = 'PENDING' AND claimed = 0
            "#,
        )
        .bind(database::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Drop the worker's claim once it stops touching the execution
    pub async fn release(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE workflow_executions SET claimed = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Set the execution's status to WAITING_FOR_APPROVAL
    ///
    /// Touches only the row with this id; returns whether it existed.
    pub async fn pause_workflow_execution(&self, id: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        pause(&mut conn, id).await
    }

    /// Pause for approval and drop the worker's claim in one transaction
    ///
    /// After this the worker must not write to the execution again: it may be approved and
    /// claimed by another worker straight away.
    pub async fn pause_and_release(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        pause(&mut tx, id).await?;
        sqlx::query("UPDATE workflow_executions SET claimed = 0 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Approve a paused execution so a worker can pick it up again
    ///
    /// Refused while the worker that ran it still holds its claim.
    pub async fn approve(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = 'PENDING' WHERE id = ? AND status = 'WAITING_FOR_APPROVAL' AND claimed = 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a terminal status
    pub async fn finish_execution(&self, id: &str, status: ExecutionStatus, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE workflow_executions SET status = ?, error = ?, completed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(database::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn start_phase(&self, phase_id: &str, inputs: &Value) -> Result<()> {
        sqlx::query("UPDATE execution_phases SET status = 'RUNNING', inputs = ?, started_at = ? WHERE id = ?")
            .bind(inputs.to_string())
            .bind(database::now())
            .bind(phase_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn complete_phase(&self, phase_id: &str, outputs: &Value, credits: i64) -> Result<()> {
        sqlx::query(
            "UPDATE execution_phases SET status = 'COMPLETED', outputs = ?, credits_consumed = ?, completed_at = ? WHERE id = ?",
        )
        .bind(outputs.to_string())
        .bind(credits)
        .bind(database::now())
        .bind(phase_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fail_phase(&self, phase_id: &str, error: &str, credits: i64) -> Result<()> {
        sqlx::query(
            "UPDATE execution_phases SET status = 'FAILED', error = ?, credits_consumed = ?, completed_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(credits)
        .bind(database::now())
        .bind(phase_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn execution_from_row(row: &SqliteRow) -> Result<WorkflowExecution> {
    let trigger: String = row.get("trigger_type");
    let status: String = row.get("status");
    let definition: String = row.get("definition");

    Ok(WorkflowExecution {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        user_id: row.get("user_id"),
        trigger: trigger.parse()?,
        status: status.parse()?,
        credits_consumed: row.get("credits_consumed"),
        definition: serde_json::from_str(&definition)?,
        error: row.get("error"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

async fn pause(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE workflow_executions SET status = ? WHERE id = ?")
        .bind(ExecutionStatus::WaitingForApproval.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

fn phase_from_row(row: &SqliteRow) -> Result<ExecutionPhase> {
    let task_type: String = row.get("task_type");
    let status: String = row.get("status");
    let node: String = row.get("node");
    let number: i64 = row.get("number");
    let inputs: Option<String> = row.get("inputs");
    let outputs: Option<String> = row.get("outputs");

    Ok(ExecutionPhase {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        user_id: row.get("user_id"),
        number: u32::try_from(number)?,
        node_id: row.get("node_id"),
        task_type: task_type.parse()?,
        node: serde_json::from_str(&node)?,
        status: status.parse()?,
        credits_consumed: row.get("credits_consumed"),
        inputs: inputs.map(|raw| serde_json::from_str(&raw)).transpose()?,
        outputs: outputs.map(|raw| serde_json::from_str(&raw)).transpose()?,
        error: row.get("error"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::BalanceStorage;
    use crate::tasks::TaskType;
    use crate::workflow::plan::build_execution_plan;
    use crate::workflow::types::{AppNode, Edge};

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition {
            nodes: vec![
                AppNode::new("launch", TaskType::LaunchBrowser).with_input("Website Url", "https://a.b"),
                AppNode::new("html", TaskType::PageToHtml),
            ],
            edges: vec![Edge::new("launch", "Web page", "html", "Web page")],
        }
    }

    async fn create(storage: &ExecutionStorage) -> WorkflowExecution {
        let definition = definition();
        let plan = build_execution_plan(&definition).unwrap();
        storage
            .create_execution("wf-1", "alice", ExecutionTrigger::Manual, &definition, &plan)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn creates_one_phase_per_node_in_plan_order() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;

        let phases = storage.get_phases(&execution.id).await.unwrap();
        let order: Vec<(u32, &str)> = phases.iter().map(|p| (p.number, p.node_id.as_str())).collect();
        assert_eq!(order, vec![(1, "launch"), (2, "html")]);
        assert!(phases.iter().all(|p| p.status == PhaseStatus::Created));

        let stored = storage.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Pending);
        assert_eq!(stored.definition, definition());
    }

    #[tokio::test]
    async fn pause_touches_only_the_target_row() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let target = create(&storage).await;
        let running = create(&storage).await;
        let pending = create(&storage).await;
        assert!(storage.claim(&running.id).await.unwrap());
        assert!(storage.claim(&target.id).await.unwrap());

        assert!(storage.pause_workflow_execution(&target.id).await.unwrap());

        assert_eq!(
            storage.get_status(&target.id).await.unwrap(),
            Some(ExecutionStatus::WaitingForApproval)
        );
        assert_eq!(storage.get_status(&running.id).await.unwrap(), Some(ExecutionStatus::Running));
        assert_eq!(storage.get_status(&pending.id).await.unwrap(), Some(ExecutionStatus::Pending));
    }

    #[tokio::test]
    async fn pausing_an_unknown_execution_reports_no_match() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        assert!(!storage.pause_workflow_execution("missing").await.unwrap());
    }

    #[tokio::test]
    async fn approve_only_applies_to_waiting_executions() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;

        assert!(!storage.approve(&execution.id).await.unwrap());
        storage.pause_workflow_execution(&execution.id).await.unwrap();
        assert!(storage.approve(&execution.id).await.unwrap());
        assert_eq!(storage.get_status(&execution.id).await.unwrap(), Some(ExecutionStatus::Pending));
    }

    #[tokio::test]
    async fn interrupted_runs_go_back_to_pending() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;
        assert!(storage.claim(&execution.id).await.unwrap());

        assert_eq!(storage.requeue_interrupted().await.unwrap(), 1);
        let pending = storage.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, execution.id);
        assert!(pending[0].started_at.is_some());

        // the dead worker's claim does not survive the restart
        assert!(storage.claim(&execution.id).await.unwrap());
    }

    #[tokio::test]
    async fn only_one_worker_can_claim_an_execution() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;

        assert!(storage.claim(&execution.id).await.unwrap());
        assert!(!storage.claim(&execution.id).await.unwrap());
        assert!(!storage.claim("missing").await.unwrap());

        // released but no longer PENDING: still not claimable
        storage.release(&execution.id).await.unwrap();
        assert!(!storage.claim(&execution.id).await.unwrap());
    }

    #[tokio::test]
    async fn approve_is_refused_while_a_worker_holds_the_run() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;
        assert!(storage.claim(&execution.id).await.unwrap());
        storage.pause_workflow_execution(&execution.id).await.unwrap();

        assert!(!storage.approve(&execution.id).await.unwrap());
        assert_eq!(
            storage.get_status(&execution.id).await.unwrap(),
            Some(ExecutionStatus::WaitingForApproval)
        );

        storage.release(&execution.id).await.unwrap();
        assert!(storage.approve(&execution.id).await.unwrap());
        assert!(storage.claim(&execution.id).await.unwrap());
    }

    #[tokio::test]
    async fn paused_and_released_runs_can_be_approved_at_once() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;
        assert!(storage.claim(&execution.id).await.unwrap());

        storage.pause_and_release(&execution.id).await.unwrap();
        assert_eq!(
            storage.get_status(&execution.id).await.unwrap(),
            Some(ExecutionStatus::WaitingForApproval)
        );
        assert!(storage.approve(&execution.id).await.unwrap());
    }

    #[tokio::test]
    async fn phase_charges_land_on_phase_execution_and_balance_together() {
        let pool = database::connect_in_memory().await.unwrap();
        let storage = ExecutionStorage::new(pool.clone());
        let balances = BalanceStorage::new(pool);
        balances.open_account("alice", 7).await.unwrap();
        let execution = create(&storage).await;
        let phases = storage.get_phases(&execution.id).await.unwrap();

        assert!(balances.charge_phase("alice", &execution.id, &phases[0].id, 5).await.unwrap());
        // too expensive for what is left: nothing is written
        assert!(!balances.charge_phase("alice", &execution.id, &phases[1].id, 3).await.unwrap());

        let phases = storage.get_phases(&execution.id).await.unwrap();
        assert_eq!(phases[0].credits_consumed, Some(5));
        assert_eq!(phases[1].credits_consumed, None);
        let stored = storage.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(stored.credits_consumed, 5);
        assert_eq!(balances.get_credits("alice").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn executions_are_hidden_from_other_users() {
        let storage = ExecutionStorage::new(database::connect_in_memory().await.unwrap());
        let execution = create(&storage).await;

        assert!(storage.get_execution_for_user("alice", &execution.id).await.unwrap().is_some());
        assert!(storage.get_execution_for_user("bob", &execution.id).await.unwrap().is_none());
        assert_eq!(storage.list_for_workflow("alice", "wf-1").await.unwrap().len(), 1);
        assert!(storage.list_for_workflow("bob", "wf-1").await.unwrap().is_empty());
    }
}
