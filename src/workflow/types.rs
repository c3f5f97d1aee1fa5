/// Core workflow type definitions
///
/// Workflows are node/edge graphs edited in the browser. Node and edge shapes follow the
/// editor's JSON (camelCase handles) so definitions round-trip without translation.

use crate::tasks::TaskType;
use crate::workflow::plan::ExecutionPlan;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// A stored workflow owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    /// Unique per user
    pub name: String,
    pub description: Option<String>,
    pub definition: WorkflowDefinition,
    pub status: WorkflowStatus,
    /// Sum of node credits, computed on publish
    pub credits_cost: i64,
    /// Phase plan, computed on publish
    pub execution_plan: Option<ExecutionPlan>,
    pub last_run_id: Option<String>,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lightweight row for listing endpoints
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: WorkflowStatus,
    pub credits_cost: i64,
    pub last_run_id: Option<String>,
    pub last_run_status: Option<String>,
    pub last_run_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Editable; runs use the current definition
    Draft,
    /// Frozen definition with a validated plan and cost
    Published,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "DRAFT",
            WorkflowStatus::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(WorkflowStatus::Draft),
            "PUBLISHED" => Ok(WorkflowStatus::Published),
            other => Err(anyhow::anyhow!("Unknown workflow status: {}", other)),
        }
    }
}

/// The editable graph: nodes plus the edges wiring outputs to inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<AppNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A single task node in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppNode {
    /// Unique node identifier within the workflow
    pub id: String,
    /// Task this node runs; determines credits and handler
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Values typed into the node, keyed by input name
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    /// Canvas position, kept only for the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Connection from one node's output handle to another node's input handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Source node ID
    pub source: String,
    /// Output name on the source node
    pub source_handle: String,
    /// Target node ID
    pub target: String,
    /// Input name on the target node
    pub target_handle: String,
}

impl AppNode {
    pub fn new(id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into(),
            task_type,
            inputs: HashMap::new(),
            position: None,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
        }
    }
}
