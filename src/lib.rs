/// UI-Butler: credit-metered browser workflow backend
///
/// Users compose workflows from a static task registry, publish them with a frozen cost
/// and execution plan, and run them through a bounded queue that charges credits node by
/// node.

// Core configuration and setup
pub mod config;

// Shared error model and gRPC -> HTTP status mapping
pub mod error;

// SQLite pool and schema
pub mod database;

// Task registry and handlers
pub mod tasks;

// Workflow definitions, cost calculation, planning and storage
pub mod workflow;

// Executions, the phase engine and the job queue
pub mod execution;

pub mod users;
pub mod auth;
pub mod billing;
pub mod analytics;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{AppError, AppResult, RpcStatus};
pub use execution::{ExecutionEngine, ExecutionQueue, ExecutionStatus};
pub use server::start_server;
pub use tasks::{TaskRegistry, TaskType};
pub use workflow::{calculate_workflow_cost, AppNode, Edge, Workflow, WorkflowDefinition};
