/// Task layer
///
/// Static task metadata (credit cost, icon, pins) and the handlers that execute nodes.

// Task types, static definitions and the handler table
pub mod registry;

// Built-in node handlers
pub mod handlers;

pub use handlers::{TaskContext, TaskHandler, TaskOutcome};
pub use registry::{TaskDefinition, TaskParam, TaskParamKind, TaskRegistry, TaskType};
