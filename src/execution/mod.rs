/// Workflow execution layer
///
/// Persisted executions and phases, the phase-by-phase engine and the bounded job queue
/// that feeds it.

pub mod engine;
pub mod queue;
pub mod storage;
pub mod types;

pub use engine::ExecutionEngine;
pub use queue::{enqueue_pending, ExecutionJob, ExecutionQueue, JobProcessor, WorkerHandle};
pub use storage::ExecutionStorage;
pub use types::{
    ExecutionPhase, ExecutionStatus, ExecutionTrigger, ExecutionWithPhases, PhaseStatus, WorkflowExecution,
};
