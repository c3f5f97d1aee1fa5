/// Workflow Management Layer
///
/// This module handles workflow definitions, persistence, cost and planning:
/// - Type definitions (Workflow, AppNode, Edge)
/// - SQLite persistence with sqlx
/// - Credit cost calculation
/// - petgraph-based phase planning

// Core workflow type definitions
pub mod types;

// SQLite persistence layer for workflow storage
pub mod storage;

// Credit cost of a workflow
pub mod cost;

// DAG validation and phase planning
pub mod plan;

// Re-export commonly used types
pub use cost::calculate_workflow_cost;
pub use plan::{build_execution_plan, ExecutionPlan, ExecutionPlanPhase, PlanError};
pub use storage::WorkflowStorage;
pub use types::{AppNode, Edge, Workflow, WorkflowDefinition, WorkflowStatus, WorkflowSummary};
