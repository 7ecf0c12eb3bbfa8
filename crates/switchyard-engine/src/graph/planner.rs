use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use switchyard_core::agent::AgentClass;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::graph::{Edge, ExecutionGraph, ExecutionPlan};

use crate::catalog::AgentCatalog;

/// Builds leveled execution plans from validated graphs.
pub struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Level a node/edge set with Kahn's algorithm.
    ///
    /// Each level is the whole zero-in-degree frontier at that step, sorted by
    /// id. Duplicate edges count once. If nodes remain when the frontier runs
    /// dry they sit on a cycle and planning fails; no partial plan is returned.
    pub fn plan(nodes: &BTreeSet<String>, edges: &[Edge]) -> Result<ExecutionPlan> {
        let unique: BTreeSet<&Edge> = edges.iter().collect();

        let mut in_degree: BTreeMap<&str, usize> =
            nodes.iter().map(|n| (n.as_str(), 0)).collect();
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for edge in &unique {
            if !nodes.contains(&edge.from) {
                return Err(SwitchyardError::UnknownNode {
                    node: edge.from.clone(),
                    referenced_by: edge.to.clone(),
                });
            }
            let Some(degree) = in_degree.get_mut(edge.to.as_str()) else {
                return Err(SwitchyardError::UnknownNode {
                    node: edge.to.clone(),
                    referenced_by: edge.from.clone(),
                });
            };
            *degree += 1;
            children
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }

        let mut frontier: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut leveled = 0usize;

        while !frontier.is_empty() {
            let mut next: BTreeSet<&str> = BTreeSet::new();
            for id in &frontier {
                for child in children.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(child);
                        }
                    }
                }
            }
            leveled += frontier.len();
            levels.push(frontier.iter().map(|id| id.to_string()).collect());
            frontier = next;
        }

        if leveled < nodes.len() {
            let stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(SwitchyardError::PlannerCycle { stuck });
        }

        debug!(levels = levels.len(), nodes = leveled, "Execution plan built");
        Ok(ExecutionPlan::new(levels))
    }

    /// Check that every member of `graph` is a registered agent of
    /// `expected_class`, that edges stay inside the graph, and that it levels.
    ///
    /// A member's declared dependency on another member must appear as an
    /// edge, otherwise the two could land in the same level.
    pub fn validate_playbook(
        graph: &ExecutionGraph,
        expected_class: AgentClass,
        all_nodes: &AgentCatalog,
    ) -> Result<()> {
        let edges: BTreeSet<(&str, &str)> = graph
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        for id in &graph.nodes {
            let agent = all_nodes
                .get(id)
                .ok_or_else(|| SwitchyardError::AgentNotFound(id.clone()))?;
            if agent.class != expected_class {
                return Err(SwitchyardError::ClassMismatch {
                    node: id.clone(),
                    expected: expected_class,
                    actual: agent.class,
                });
            }
            if let Some(parent) = agent
                .dependencies
                .iter()
                .find(|p| graph.nodes.contains(*p) && !edges.contains(&(p.as_str(), id.as_str())))
            {
                return Err(SwitchyardError::MissingEdge {
                    parent: parent.clone(),
                    child: id.clone(),
                });
            }
        }
        Self::plan(&graph.nodes, &graph.edges).map(|_| ())
    }

    /// Validate a playbook graph and build its plan in one step.
    pub fn plan_playbook(
        graph: &ExecutionGraph,
        expected_class: AgentClass,
        all_nodes: &AgentCatalog,
    ) -> Result<ExecutionPlan> {
        Self::validate_playbook(graph, expected_class, all_nodes)?;
        Self::plan(&graph.nodes, &graph.edges)
    }
}
