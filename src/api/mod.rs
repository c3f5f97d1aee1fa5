/// HTTP API Layer
///
/// REST endpoints for accounts, workflows, executions, billing and analytics. Every
/// handler returns [`AppResult`](crate::error::AppResult) so failures render through the
/// shared gRPC -> HTTP status table.

pub mod analytics;
pub mod auth;
pub mod billing;
pub mod executions;
pub mod tasks;
pub mod workflows;

use crate::{
    analytics::AnalyticsStorage,
    auth::TokenService,
    billing::BalanceStorage,
    config::Config,
    execution::{ExecutionQueue, ExecutionStorage},
    tasks::TaskRegistry,
    users::UserStorage,
    workflow::WorkflowStorage,
};
use axum::{extract::FromRef, Router};
use std::sync::Arc;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: UserStorage,
    pub workflows: WorkflowStorage,
    pub executions: ExecutionStorage,
    pub balances: BalanceStorage,
    pub analytics: AnalyticsStorage,
    /// Task metadata and handlers
    pub tasks: Arc<TaskRegistry>,
    /// Producer side of the execution queue
    pub queue: ExecutionQueue,
    pub tokens: Arc<TokenService>,
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.tokens)
    }
}

/// All API routes, ready for `with_state`
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::create_auth_routes())
        .merge(tasks::create_task_routes())
        .merge(workflows::create_workflow_routes())
        .merge(executions::create_execution_routes())
        .merge(billing::create_billing_routes())
        .merge(analytics::create_analytics_routes())
}
