use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;

use switchyard_core::agent::AgentClass;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::graph::Edge;

use crate::catalog::AgentCatalog;

/// Save-time checks on agent dependency sets.
pub struct GraphValidator;

impl GraphValidator {
    /// Check that giving `candidate_id` the dependency set `candidate_deps`
    /// keeps the catalog acyclic.
    ///
    /// Every dependency must name a known agent (or the candidate itself,
    /// which is then reported as a cycle). On a cycle the error carries the
    /// closed walk, e.g. `a -> b -> c -> a`, following dependency direction.
    pub fn validate(
        candidate_id: &str,
        candidate_deps: &BTreeSet<String>,
        all_nodes: &AgentCatalog,
    ) -> Result<()> {
        for dep in candidate_deps {
            if dep != candidate_id && !all_nodes.contains(dep) {
                return Err(SwitchyardError::UnknownNode {
                    node: dep.clone(),
                    referenced_by: candidate_id.to_string(),
                });
            }
        }

        let mut adjacency: BTreeMap<&str, Vec<&str>> = all_nodes
            .iter()
            .map(|node| {
                (
                    node.id.as_str(),
                    node.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        adjacency.insert(
            candidate_id,
            candidate_deps.iter().map(String::as_str).collect(),
        );

        match find_cycle_from(candidate_id, &adjacency) {
            Some(path) => {
                debug!(
                    agent_id = %candidate_id,
                    cycle = %path.join(" -> "),
                    "Dependency cycle rejected"
                );
                Err(SwitchyardError::CycleDetected { path })
            }
            None => Ok(()),
        }
    }

    /// Reject an edge set in which any node has more than one incoming edge.
    ///
    /// Applied to user-defined agents only; playbook graphs may be diamonds.
    pub fn validate_single_parent(edges: &[Edge]) -> Result<()> {
        let mut parents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in edges {
            parents
                .entry(edge.to.as_str())
                .or_default()
                .insert(edge.from.as_str());
        }
        for (node, from) in parents {
            if from.len() > 1 {
                return Err(SwitchyardError::MultipleParents {
                    node: node.to_string(),
                    parents: from.into_iter().map(str::to_string).collect(),
                });
            }
        }
        Ok(())
    }

    /// Collect `node_id` and everything it transitively depends on, for display.
    ///
    /// Not used by execution. Unknown dependencies appear as nodes with the
    /// id as label and no class.
    pub fn build_visualization_graph(
        node_id: &str,
        all_nodes: &AgentCatalog,
    ) -> Result<VisualizationGraph> {
        if !all_nodes.contains(node_id) {
            return Err(SwitchyardError::AgentNotFound(node_id.to_string()));
        }

        let mut graph = VisualizationGraph::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        seen.insert(node_id.to_string());
        queue.push_back(node_id.to_string());

        while let Some(id) = queue.pop_front() {
            let agent = all_nodes.get(&id);
            graph.nodes.push(VisualizationNode {
                id: id.clone(),
                label: agent.map_or_else(|| id.clone(), |a| a.name.clone()),
                class: agent.map(|a| a.class),
            });

            let Some(agent) = agent else { continue };
            for parent in &agent.dependencies {
                graph.edges.push(VisualizationEdge {
                    from: parent.clone(),
                    to: id.clone(),
                });
                if seen.insert(parent.clone()) {
                    queue.push_back(parent.clone());
                }
            }
        }

        Ok(graph)
    }
}

/// Depth-first search from `start` with an explicit stack.
///
/// Returns the closed walk `[n0, n1, ..., n0]` for the first back edge found.
fn find_cycle_from(start: &str, adjacency: &BTreeMap<&str, Vec<&str>>) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = vec![start];
    // (node, index of next neighbour to explore)
    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
    visited.insert(start);
    on_path.insert(start);

    while let Some(frame) = stack.last_mut() {
        let (node, next) = *frame;
        let neighbours = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);

        if next < neighbours.len() {
            frame.1 += 1;
            let target = neighbours[next];
            if on_path.contains(target) {
                let pos = path.iter().position(|n| *n == target).unwrap_or(0);
                let mut cycle: Vec<String> = path[pos..].iter().map(|n| n.to_string()).collect();
                cycle.push(target.to_string());
                return Some(cycle);
            }
            if visited.insert(target) {
                on_path.insert(target);
                path.push(target);
                stack.push((target, 0));
            }
        } else {
            stack.pop();
            on_path.remove(node);
            path.pop();
        }
    }

    None
}

/// Display graph of an agent and its ancestry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisualizationGraph {
    pub nodes: Vec<VisualizationNode>,
    pub edges: Vec<VisualizationEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationNode {
    pub id: String,
    pub label: String,
    pub class: Option<AgentClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationEdge {
    pub from: String,
    pub to: String,
}
