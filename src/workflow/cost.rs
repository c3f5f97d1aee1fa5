/// Workflow credit cost
///
/// The cost of running a workflow once is the sum of the registered credits of its nodes.

use crate::tasks::TaskRegistry;
use crate::workflow::types::AppNode;

/// Total credits needed to run every node once; 0 for an empty workflow
pub fn calculate_workflow_cost(nodes: &[AppNode], registry: &TaskRegistry) -> u32 {
    nodes
        .iter()
        .map(|node| registry.credits(node.task_type))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskType;

    #[test]
    fn two_browser_launches_cost_ten() {
        let registry = TaskRegistry::new();
        let nodes = vec![
            AppNode::new("a", TaskType::LaunchBrowser),
            AppNode::new("b", TaskType::LaunchBrowser),
        ];
        assert_eq!(calculate_workflow_cost(&nodes, &registry), 10);
    }

    #[test]
    fn empty_workflow_is_free() {
        assert_eq!(calculate_workflow_cost(&[], &TaskRegistry::new()), 0);
    }

    #[test]
    fn mixed_nodes_sum_their_registered_credits() {
        let registry = TaskRegistry::new();
        let nodes: Vec<AppNode> = TaskType::ALL
            .iter()
            .enumerate()
            .map(|(i, task_type)| AppNode::new(format!("n{i}"), *task_type))
            .collect();

        let expected: u32 = TaskType::ALL.iter().map(|t| t.definition().credits).sum();
        assert_eq!(calculate_workflow_cost(&nodes, &registry), expected);
        assert_eq!(expected, 22);
    }
}
