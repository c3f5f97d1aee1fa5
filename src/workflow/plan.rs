/// Execution planning with petgraph
///
/// Converts a workflow definition into a DAG, validates it, and groups nodes into
/// numbered phases. A node's phase is one past the latest phase of the nodes feeding it,
/// so every phase only depends on outputs produced by earlier phases.

use crate::workflow::types::{AppNode, WorkflowDefinition};
use crate::tasks::TaskParamKind;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered list of phases; phase numbers start at 1
pub type ExecutionPlan = Vec<ExecutionPlanPhase>;

/// Nodes that can run once all earlier phases completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlanPhase {
    pub phase: u32,
    pub nodes: Vec<AppNode>,
}

/// Required inputs a node is missing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidNodeInputs {
    pub node_id: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("workflow has no entry point")]
    NoEntryPoint,

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),

    #[error("workflow contains a cycle through node '{0}'")]
    Cycle(String),

    #[error("{} node(s) have invalid inputs", .0.len())]
    InvalidInputs(Vec<InvalidNodeInputs>),
}

/// Internal representation of a workflow as a petgraph DAG
struct WorkflowGraph<'a> {
    /// Graph weights are the definition's nodes
    graph: DiGraph<&'a AppNode, ()>,
    node_id_to_index: HashMap<&'a str, NodeIndex>,
}

/// Build the phase plan for a workflow definition
///
/// Fails when there is no entry point, an edge names an unknown node, the graph has a
/// cycle, or a required input is neither typed in nor connected.
pub fn build_execution_plan(definition: &WorkflowDefinition) -> Result<ExecutionPlan, PlanError> {
    let graph = build_workflow_graph(definition)?;

    let entry_points: Vec<NodeIndex> = graph
        .graph
        .node_indices()
        .filter(|&idx| graph.graph[idx].task_type.definition().is_entry_point)
        .collect();
    if entry_points.is_empty() {
        return Err(PlanError::NoEntryPoint);
    }

    let invalid = find_invalid_inputs(definition);
    if !invalid.is_empty() {
        return Err(PlanError::InvalidInputs(invalid));
    }

    let topo_order = toposort(&graph.graph, None)
        .map_err(|cycle| PlanError::Cycle(graph.graph[cycle.node_id()].id.clone()))?;

    let mut phases: HashMap<NodeIndex, u32> = HashMap::new();
    for idx in topo_order {
        let phase = if graph.graph[idx].task_type.definition().is_entry_point {
            1
        } else {
            1 + graph
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter_map(|pred| phases.get(&pred).copied())
                .max()
                .unwrap_or(1)
        };
        phases.insert(idx, phase);
    }

    // Keep definition order inside each phase
    let mut grouped: BTreeMap<u32, Vec<AppNode>> = BTreeMap::new();
    for node in &definition.nodes {
        let idx = graph.node_id_to_index[node.id.as_str()];
        grouped.entry(phases[&idx]).or_default().push(node.clone());
    }

    let plan: ExecutionPlan = grouped
        .into_iter()
        .map(|(phase, nodes)| ExecutionPlanPhase { phase, nodes })
        .collect();

    tracing::debug!("📋 Planned {} nodes into {} phases", definition.nodes.len(), plan.len());
    Ok(plan)
}

fn build_workflow_graph(definition: &WorkflowDefinition) -> Result<WorkflowGraph<'_>, PlanError> {
    let mut graph = DiGraph::new();
    let mut node_id_to_index = HashMap::new();

    for node in &definition.nodes {
        let idx = graph.add_node(node);
        if node_id_to_index.insert(node.id.as_str(), idx).is_some() {
            return Err(PlanError::DuplicateNode(node.id.clone()));
        }
    }

    for edge in &definition.edges {
        let from = node_id_to_index
            .get(edge.source.as_str())
            .ok_or_else(|| PlanError::UnknownNode(edge.source.clone()))?;
        let to = node_id_to_index
            .get(edge.target.as_str())
            .ok_or_else(|| PlanError::UnknownNode(edge.target.clone()))?;
        graph.add_edge(*from, *to, ());
    }

    Ok(WorkflowGraph { graph, node_id_to_index })
}

/// Required inputs must be typed in or connected; browser instances only via edges
fn find_invalid_inputs(definition: &WorkflowDefinition) -> Vec<InvalidNodeInputs> {
    let mut invalid = Vec::new();

    for node in &definition.nodes {
        let missing: Vec<String> = node
            .task_type
            .definition()
            .inputs
            .iter()
            .filter(|param| param.required)
            .filter(|param| {
                let connected = definition
                    .edges
                    .iter()
                    .any(|edge| edge.target == node.id && edge.target_handle == param.name);
                let typed_in = param.kind != TaskParamKind::BrowserInstance
                    && node.inputs.get(param.name).is_some_and(|value| !value.is_empty());
                !(connected || typed_in)
            })
            .map(|param| param.name.to_string())
            .collect();

        if !missing.is_empty() {
            invalid.push(InvalidNodeInputs {
                node_id: node.id.clone(),
                inputs: missing,
            });
        }
    }

    invalid
}
