/// Workflow management REST API endpoints
///
/// CRUD over a user's workflows, publishing (plan validation plus cost freeze), cost
/// preview and manual runs. Definitions can only change while a workflow is a draft.

use crate::{
    api::AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    execution::{ExecutionJob, ExecutionStatus, ExecutionTrigger, WorkflowExecution},
    workflow::{
        build_execution_plan, calculate_workflow_cost, Workflow, WorkflowDefinition, WorkflowStatus,
        WorkflowSummary,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for definition updates
#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub definition: WorkflowDefinition,
}

#[derive(Debug, Serialize)]
pub struct RunWorkflowResponse {
    pub execution_id: String,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/workflows/{id}/publish", post(publish_workflow))
        .route("/workflows/{id}/unpublish", post(unpublish_workflow))
        .route("/workflows/{id}/cost", get(workflow_cost))
        .route("/workflows/{id}/run", post(run_workflow))
        .route("/workflows/{id}/executions", get(list_executions))
}

/// Create a new draft workflow
///
/// POST /workflows
/// Body: { "name": "...", "description": "..." }
async fn create_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateWorkflowRequest>,
) -> AppResult<(StatusCode, Json<Workflow>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidArgument("Workflow name is required".to_string()));
    }
    if state.workflows.name_exists(&user.id, name).await? {
        return Err(AppError::AlreadyExists(format!("Workflow '{}' already exists", name)));
    }

    let workflow = state
        .workflows
        .create_workflow(&user.id, name, payload.description.as_deref())
        .await
        .map_err(|e| AppError::from(e).on_conflict(format!("Workflow '{}' already exists", name)))?;

    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /workflows
async fn list_workflows(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<WorkflowSummary>>> {
    Ok(Json(state.workflows.list_workflows(&user.id).await?))
}

/// GET /workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Workflow>> {
    Ok(Json(load_workflow(&state, &user, &id).await?))
}

/// Replace the definition of a draft workflow
///
/// PUT /workflows/{id}
/// Body: { "definition": { "nodes": [...], "edges": [...] } }
async fn update_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateWorkflowRequest>,
) -> AppResult<Json<Workflow>> {
    let workflow = load_workflow(&state, &user, &id).await?;
    if workflow.status != WorkflowStatus::Draft {
        return Err(AppError::FailedPrecondition(
            "Published workflows cannot be edited, unpublish first".to_string(),
        ));
    }

    if !state.workflows.update_definition(&user.id, &id, &payload.definition).await? {
        return Err(AppError::FailedPrecondition(format!("Workflow {} is no longer a draft", id)));
    }
    tracing::info!("📝 Updated workflow {} ({} nodes)", id, payload.definition.nodes.len());

    Ok(Json(load_workflow(&state, &user, &id).await?))
}

/// DELETE /workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.workflows.delete_workflow(&user.id, &id).await? {
        return Err(not_found(&id));
    }
    tracing::info!("🗑️ Deleted workflow {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Validate the plan, freeze the cost and mark the workflow PUBLISHED
///
/// POST /workflows/{id}/publish
async fn publish_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Workflow>> {
    let workflow = load_workflow(&state, &user, &id).await?;
    if workflow.status == WorkflowStatus::Published {
        return Err(AppError::FailedPrecondition(format!("Workflow {} is already published", id)));
    }

    let plan = build_execution_plan(&workflow.definition)?;
    let cost = calculate_workflow_cost(&workflow.definition.nodes, &state.tasks);
    state.workflows.publish(&user.id, &id, &plan, i64::from(cost)).await?;
    tracing::info!("📢 Published workflow {} ({} phases, {} credits)", id, plan.len(), cost);

    Ok(Json(load_workflow(&state, &user, &id).await?))
}

/// POST /workflows/{id}/unpublish
async fn unpublish_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Workflow>> {
    let workflow = load_workflow(&state, &user, &id).await?;
    if workflow.status == WorkflowStatus::Draft {
        return Err(AppError::FailedPrecondition(format!("Workflow {} is not published", id)));
    }

    state.workflows.unpublish(&user.id, &id).await?;
    Ok(Json(load_workflow(&state, &user, &id).await?))
}

/// Credits one run of the current definition would consume
///
/// GET /workflows/{id}/cost
async fn workflow_cost(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let workflow = load_workflow(&state, &user, &id).await?;
    let credits = calculate_workflow_cost(&workflow.definition.nodes, &state.tasks);
    Ok(Json(json!({ "credits": credits })))
}

/// Create an execution with its phases and hand it to the queue
///
/// POST /workflows/{id}/run
///
/// Published workflows run their frozen plan; drafts are planned on the fly. The run is
/// refused up front when the balance cannot cover the whole workflow.
async fn run_workflow(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<RunWorkflowResponse>)> {
    let workflow = load_workflow(&state, &user, &id).await?;

    let plan = match workflow.execution_plan {
        Some(plan) if workflow.status == WorkflowStatus::Published => plan,
        _ => build_execution_plan(&workflow.definition)?,
    };

    let required = i64::from(calculate_workflow_cost(&workflow.definition.nodes, &state.tasks));
    let available = state.balances.get_credits(&user.id).await?;
    if available < required {
        return Err(AppError::InsufficientCredits { required, available });
    }

    let execution = state
        .executions
        .create_execution(&workflow.id, &user.id, ExecutionTrigger::Manual, &workflow.definition, &plan)
        .await?;
    state
        .workflows
        .record_last_run(&workflow.id, &execution.id, ExecutionStatus::Pending.as_str())
        .await?;

    state
        .queue
        .enqueue(ExecutionJob {
            execution_id: execution.id.clone(),
            workflow_id: workflow.id,
            user_id: user.id,
        })
        .await?;
    tracing::info!("▶️ Queued execution {} of workflow {}", execution.id, id);

    Ok((
        StatusCode::ACCEPTED,
        Json(RunWorkflowResponse {
            execution_id: execution.id,
        }),
    ))
}

/// GET /workflows/{id}/executions
async fn list_executions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<WorkflowExecution>>> {
    load_workflow(&state, &user, &id).await?;
    Ok(Json(state.executions.list_for_workflow(&user.id, &id).await?))
}

async fn load_workflow(state: &AppState, user: &AuthUser, id: &str) -> AppResult<Workflow> {
    state
        .workflows
        .get_workflow(&user.id, id)
        .await?
        .ok_or_else(|| not_found(id))
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Workflow {} not found", id))
}
