/// Phase-by-phase workflow execution
///
/// Walks the persisted phases of an execution in plan order. Each node is charged its
/// task credits before its handler runs; outputs flow to downstream inputs along the
/// definition's edges. Completed phases are skipped, so an execution paused for approval
/// resumes where it stopped.

use crate::billing::BalanceStorage;
use crate::execution::queue::{ExecutionJob, JobProcessor};
use crate::execution::storage::ExecutionStorage;
use crate::execution::types::{ExecutionPhase, ExecutionStatus, PhaseStatus, WorkflowExecution};
use crate::tasks::{TaskContext, TaskOutcome, TaskRegistry};
use crate::workflow::storage::WorkflowStorage;
use crate::workflow::types::{AppNode, Edge};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Outputs of finished nodes: node id -> output name -> value
type NodeOutputs = HashMap<String, HashMap<String, Value>>;

#[derive(Debug)]
pub struct ExecutionEngine {
    executions: ExecutionStorage,
    workflows: WorkflowStorage,
    balances: BalanceStorage,
    tasks: Arc<TaskRegistry>,
}

/// How a pass over the phases ended
enum PhaseRun {
    Finished,
    Paused,
    /// An approval gate paused the run and released it; the pass must not write again
    HandedOff,
}

impl ExecutionEngine {
    pub fn new(
        executions: ExecutionStorage,
        workflows: WorkflowStorage,
        balances: BalanceStorage,
        tasks: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            executions,
            workflows,
            balances,
            tasks,
        }
    }

    /// Run (or resume) an execution and return the status it ended in
    ///
    /// Only a PENDING execution nobody else holds is run; anything else is left untouched
    /// and its current status returned. Node failures are recorded on the execution rather
    /// than returned; only storage failures surface as errors.
    pub async fn execute_workflow(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let execution = self
            .executions
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Execution not found: {}", execution_id))?;

        if !self.executions.claim(&execution.id).await? {
            let status = self.executions.get_status(&execution.id).await?.unwrap_or(execution.status);
            tracing::info!("⏭️ Skipping execution {} in status {}", execution_id, status);
            return Ok(status);
        }

        let started = std::time::Instant::now();
        tracing::info!("🚀 Starting execution {} of workflow {}", execution.id, execution.workflow_id);

        let run = self.run_claimed(&execution).await;
        if let Ok(PhaseRun::HandedOff) = run {
            tracing::info!("⏸️ Execution {} is waiting for approval", execution.id);
            return Ok(ExecutionStatus::WaitingForApproval);
        }

        let settled = self.settle(&execution, run, started).await;
        let recorded = match &settled {
            Ok(status) => {
                self.workflows
                    .record_last_run(&execution.workflow_id, &execution.id, status.as_str())
                    .await
            }
            Err(_) => Ok(()),
        };
        // Last write of the pass, made even when settling failed
        let released = self.executions.release(&execution.id).await;

        let status = settled?;
        recorded?;
        released?;
        Ok(status)
    }

    async fn run_claimed(&self, execution: &WorkflowExecution) -> Result<PhaseRun> {
        self.workflows
            .record_last_run(&execution.workflow_id, &execution.id, ExecutionStatus::Running.as_str())
            .await?;

        let phases = self.executions.get_phases(&execution.id).await?;
        let mut outputs = completed_outputs(&phases);
        self.run_phases(execution, &phases, &mut outputs).await
    }

    /// Persist how a pass ended
    async fn settle(
        &self,
        execution: &WorkflowExecution,
        run: Result<PhaseRun>,
        started: std::time::Instant,
    ) -> Result<ExecutionStatus> {
        match run {
            Ok(PhaseRun::Finished) => {
                self.executions
                    .finish_execution(&execution.id, ExecutionStatus::Completed, None)
                    .await?;
                tracing::info!("🎉 Execution {} completed in {:?}", execution.id, started.elapsed());
                Ok(ExecutionStatus::Completed)
            }
            Ok(PhaseRun::Paused | PhaseRun::HandedOff) => {
                tracing::info!("⏸️ Execution {} is waiting for approval", execution.id);
                Ok(ExecutionStatus::WaitingForApproval)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!("❌ Execution {} failed: {}", execution.id, message);
                self.executions
                    .finish_execution(&execution.id, ExecutionStatus::Failed, Some(&message))
                    .await?;
                Ok(ExecutionStatus::Failed)
            }
        }
    }

    async fn run_phases(
        &self,
        execution: &WorkflowExecution,
        phases: &[ExecutionPhase],
        outputs: &mut NodeOutputs,
    ) -> Result<PhaseRun> {
        let total = phases.len();

        for (step, phase) in phases.iter().enumerate() {
            if phase.status == PhaseStatus::Completed {
                tracing::debug!("⏭️ Phase {} ({}) already completed", phase.number, phase.node_id);
                continue;
            }

            // Honour a pause requested through the API since the last phase
            if self.executions.get_status(&execution.id).await? == Some(ExecutionStatus::WaitingForApproval) {
                return Ok(PhaseRun::Paused);
            }

            tracing::info!(
                "📍 Step {}/{}: node '{}' ({}) in phase {}",
                step + 1,
                total,
                phase.node_id,
                phase.task_type,
                phase.number
            );

            let inputs = resolve_inputs(&phase.node, &execution.definition.edges, outputs);
            self.executions
                .start_phase(&phase.id, &serde_json::to_value(&inputs)?)
                .await?;

            let credits = match phase.credits_consumed {
                // charged before a restart interrupted the node
                Some(charged) => {
                    tracing::info!("💰 Node '{}' was already charged {} credits", phase.node_id, charged);
                    charged
                }
                None => {
                    let credits = i64::from(self.tasks.credits(phase.task_type));
                    if !self
                        .balances
                        .charge_phase(&execution.user_id, &execution.id, &phase.id, credits)
                        .await?
                    {
                        let message =
                            format!("Insufficient credits to run node '{}' (needs {})", phase.node_id, credits);
                        self.executions.fail_phase(&phase.id, &message, 0).await?;
                        return Err(anyhow::anyhow!(message));
                    }
                    credits
                }
            };

            let Some(handler) = self.tasks.handler(phase.task_type) else {
                let message = format!("No handler registered for task type {}", phase.task_type);
                self.executions.fail_phase(&phase.id, &message, credits).await?;
                return Err(anyhow::anyhow!(message));
            };

            let node_started = std::time::Instant::now();
            let ctx = TaskContext {
                execution_id: execution.id.clone(),
                node_id: phase.node_id.clone(),
                task_type: phase.task_type,
                inputs,
            };

            match handler.run(ctx).await {
                Ok(TaskOutcome::Completed(node_outputs)) => {
                    self.executions
                        .complete_phase(&phase.id, &serde_json::to_value(&node_outputs)?, credits)
                        .await?;
                    tracing::info!("✅ Node '{}' completed in {:?}", phase.node_id, node_started.elapsed());
                    outputs.insert(phase.node_id.clone(), node_outputs);
                }
                Ok(TaskOutcome::AwaitApproval) => {
                    self.executions
                        .complete_phase(&phase.id, &Value::Object(Default::default()), credits)
                        .await?;
                    self.workflows
                        .record_last_run(
                            &execution.workflow_id,
                            &execution.id,
                            ExecutionStatus::WaitingForApproval.as_str(),
                        )
                        .await?;
                    self.executions.pause_and_release(&execution.id).await?;
                    return Ok(PhaseRun::HandedOff);
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    self.executions.fail_phase(&phase.id, &message, credits).await?;
                    return Err(e.context(format!("Node '{}' failed", phase.node_id)));
                }
            }
        }

        Ok(PhaseRun::Finished)
    }
}

#[async_trait]
impl JobProcessor for ExecutionEngine {
    async fn process(&self, job: ExecutionJob) -> Result<()> {
        self.execute_workflow(&job.execution_id).await.map(|_| ())
    }
}

/// Outputs recorded by phases that finished in an earlier pass
fn completed_outputs(phases: &[ExecutionPhase]) -> NodeOutputs {
    phases
        .iter()
        .filter(|phase| phase.status == PhaseStatus::Completed)
        .filter_map(|phase| {
            let outputs = phase.outputs.clone()?;
            let outputs: HashMap<String, Value> = serde_json::from_value(outputs).ok()?;
            Some((phase.node_id.clone(), outputs))
        })
        .collect()
}

/// Static node inputs overlaid by upstream outputs wired to them
fn resolve_inputs(node: &AppNode, edges: &[Edge], outputs: &NodeOutputs) -> HashMap<String, Value> {
    let mut inputs: HashMap<String, Value> = node
        .inputs
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();

    for edge in edges.iter().filter(|edge| edge.target == node.id) {
        if let Some(value) = outputs
            .get(&edge.source)
            .and_then(|node_outputs| node_outputs.get(&edge.source_handle))
        {
            inputs.insert(edge.target_handle.clone(), value.clone());
        }
    }

    inputs
}
