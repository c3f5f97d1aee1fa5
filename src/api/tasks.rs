/// Task catalogue endpoint

use crate::{api::AppState, tasks::TaskDefinition};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

/// One registry entry plus whether this server can run it
#[derive(Debug, Serialize)]
pub struct TaskListing {
    #[serde(flatten)]
    pub definition: &'static TaskDefinition,
    pub runnable: bool,
}

pub fn create_task_routes() -> Router<AppState> {
    Router::new().route("/tasks", get(list_tasks))
}

/// GET /tasks
async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskListing>> {
    Json(
        state
            .tasks
            .definitions()
            .map(|definition| TaskListing {
                definition,
                runnable: state.tasks.has_handler(definition.task_type),
            })
            .collect(),
    )
}
