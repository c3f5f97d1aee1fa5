/// Execution inspection and approval endpoints

use crate::{
    api::AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    execution::{ExecutionJob, ExecutionStatus, ExecutionWithPhases, WorkflowExecution},
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ExecutionStatusResponse {
    pub id: String,
    pub status: ExecutionStatus,
}

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/executions/{id}", get(get_execution))
        .route("/executions/{id}/pause", post(pause_execution))
        .route("/executions/{id}/approve", post(approve_execution))
}

/// GET /executions/{id}
async fn get_execution(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ExecutionWithPhases>> {
    let execution = load_execution(&state, &user, &id).await?;
    let phases = state.executions.get_phases(&id).await?;
    Ok(Json(ExecutionWithPhases { execution, phases }))
}

/// Put an execution on hold until it is approved
///
/// POST /executions/{id}/pause
async fn pause_execution(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ExecutionStatusResponse>> {
    let execution = load_execution(&state, &user, &id).await?;
    if execution.status.is_terminal() {
        return Err(AppError::FailedPrecondition(format!(
            "Execution {} already finished with status {}",
            id, execution.status
        )));
    }

    if !state.executions.pause_workflow_execution(&id).await? {
        return Err(not_found(&id));
    }
    tracing::info!("⏸️ Paused execution {}", id);

    Ok(Json(ExecutionStatusResponse {
        id,
        status: ExecutionStatus::WaitingForApproval,
    }))
}

/// Release a paused execution back to the queue
///
/// POST /executions/{id}/approve
async fn approve_execution(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<ExecutionStatusResponse>> {
    let execution = load_execution(&state, &user, &id).await?;
    if execution.status != ExecutionStatus::WaitingForApproval {
        return Err(AppError::FailedPrecondition(format!(
            "Execution {} is not waiting for approval",
            id
        )));
    }
    if !state.executions.approve(&id).await? {
        return Err(AppError::FailedPrecondition(format!(
            "Execution {} is still finishing its current node, approve it once it has stopped",
            id
        )));
    }

    state
        .queue
        .enqueue(ExecutionJob {
            execution_id: execution.id.clone(),
            workflow_id: execution.workflow_id,
            user_id: execution.user_id,
        })
        .await?;
    tracing::info!("👍 Approved execution {}", id);

    Ok(Json(ExecutionStatusResponse {
        id,
        status: ExecutionStatus::Pending,
    }))
}

async fn load_execution(state: &AppState, user: &AuthUser, id: &str) -> AppResult<WorkflowExecution> {
    state
        .executions
        .get_execution_for_user(&user.id, id)
        .await?
        .ok_or_else(|| not_found(id))
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Execution {} not found", id))
}
