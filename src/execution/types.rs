/// Execution and phase records
///
/// An execution is one run of a workflow. It owns one phase per planned node; phases are
/// numbered by plan phase so the engine can walk them in order and resume after a pause.

use crate::tasks::TaskType;
use crate::workflow::types::{AppNode, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    WaitingForApproval,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub const ALL: [ExecutionStatus; 5] = [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::WaitingForApproval,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::WaitingForApproval => "WAITING_FOR_APPROVAL",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
        }
    }

    /// Completed and failed executions never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown execution status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Created,
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Created => "CREATED",
            PhaseStatus::Pending => "PENDING",
            PhaseStatus::Running => "RUNNING",
            PhaseStatus::Completed => "COMPLETED",
            PhaseStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PhaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(PhaseStatus::Created),
            "PENDING" => Ok(PhaseStatus::Pending),
            "RUNNING" => Ok(PhaseStatus::Running),
            "COMPLETED" => Ok(PhaseStatus::Completed),
            "FAILED" => Ok(PhaseStatus::Failed),
            other => Err(anyhow::anyhow!("Unknown phase status: {}", other)),
        }
    }
}

/// How an execution was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionTrigger {
    Manual,
}

impl ExecutionTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionTrigger::Manual => "MANUAL",
        }
    }
}

impl FromStr for ExecutionTrigger {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(ExecutionTrigger::Manual),
            other => Err(anyhow::anyhow!("Unknown execution trigger: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub user_id: String,
    pub trigger: ExecutionTrigger,
    pub status: ExecutionStatus,
    pub credits_consumed: i64,
    /// Definition snapshot taken when the run was requested
    pub definition: WorkflowDefinition,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPhase {
    pub id: String,
    pub execution_id: String,
    pub user_id: String,
    /// Plan phase this node belongs to
    pub number: u32,
    pub node_id: String,
    pub task_type: TaskType,
    pub node: AppNode,
    pub status: PhaseStatus,
    pub credits_consumed: Option<i64>,
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Execution with its phases, as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionWithPhases {
    #[serde(flatten)]
    pub execution: WorkflowExecution,
    pub phases: Vec<ExecutionPhase>,
}
